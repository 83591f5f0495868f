//! Mock hardware backend
//!
//! Pins and PWM channels backed by shared in-memory state, with probe
//! handles so tests can inspect what the control logic actually commanded.
//! Actuator writes can additionally be traced onto a channel to assert on
//! the *order* of commands during a maneuver.

use crate::actuators::drive::{DriveMotors, MotorChannel};
use crate::actuators::steering::SteeringServo;
use crate::config::CarConfig;
use crate::error::{Error, Result};
use crate::hw::{DigitalInput, DigitalOutput, HardwareSet, PwmChannel};
use crate::sensors::rgb::RgbSensor;
use crate::sensors::DistanceSensor;
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// One actuator write, as seen by the mock backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HwEvent {
    /// A direction line changed level
    Pin { name: &'static str, high: bool },
    /// A PWM channel was set to an on-time
    Pwm { name: &'static str, ticks: u16 },
    /// A PWM channel was switched full-off
    PwmOff { name: &'static str },
}

fn trace(tx: &Option<Sender<HwEvent>>, event: HwEvent) {
    if let Some(tx) = tx {
        // Receiver may be long gone; the mock keeps working regardless
        let _ = tx.send(event);
    }
}

/// Mock digital output with inspectable level
pub struct MockPin {
    name: &'static str,
    state: Arc<Mutex<bool>>,
    tx: Option<Sender<HwEvent>>,
}

impl MockPin {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Arc::new(Mutex::new(false)),
            tx: None,
        }
    }

    pub fn traced(name: &'static str, tx: Sender<HwEvent>) -> Self {
        Self {
            name,
            state: Arc::new(Mutex::new(false)),
            tx: Some(tx),
        }
    }

    /// Handle for inspecting the pin level after ownership moves into an
    /// actuator
    pub fn probe(&self) -> MockPinProbe {
        MockPinProbe(Arc::clone(&self.state))
    }
}

impl DigitalOutput for MockPin {
    fn set_high(&mut self) {
        *self.state.lock() = true;
        trace(
            &self.tx,
            HwEvent::Pin {
                name: self.name,
                high: true,
            },
        );
    }

    fn set_low(&mut self) {
        *self.state.lock() = false;
        trace(
            &self.tx,
            HwEvent::Pin {
                name: self.name,
                high: false,
            },
        );
    }
}

/// Read-side handle to a [`MockPin`]
#[derive(Clone)]
pub struct MockPinProbe(Arc<Mutex<bool>>);

impl MockPinProbe {
    pub fn is_high(&self) -> bool {
        *self.0.lock()
    }
}

/// Mock digital input whose level tests drive directly
#[derive(Clone)]
pub struct MockLevelInput {
    level: Arc<Mutex<bool>>,
}

impl MockLevelInput {
    pub fn new(initial_high: bool) -> Self {
        Self {
            level: Arc::new(Mutex::new(initial_high)),
        }
    }

    pub fn set_level(&self, high: bool) {
        *self.level.lock() = high;
    }
}

impl DigitalInput for MockLevelInput {
    fn is_high(&self) -> bool {
        *self.level.lock()
    }
}

#[derive(Debug, Clone, Copy)]
struct PwmState {
    ticks: u16,
    enabled: bool,
}

/// Mock PWM channel with inspectable duty state
pub struct MockPwm {
    name: &'static str,
    state: Arc<Mutex<PwmState>>,
    tx: Option<Sender<HwEvent>>,
}

impl MockPwm {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Arc::new(Mutex::new(PwmState {
                ticks: 0,
                enabled: false,
            })),
            tx: None,
        }
    }

    pub fn traced(name: &'static str, tx: Sender<HwEvent>) -> Self {
        Self {
            name,
            state: Arc::new(Mutex::new(PwmState {
                ticks: 0,
                enabled: false,
            })),
            tx: Some(tx),
        }
    }

    pub fn probe(&self) -> MockPwmProbe {
        MockPwmProbe(Arc::clone(&self.state))
    }
}

impl PwmChannel for MockPwm {
    fn set_ticks(&mut self, ticks: u16) -> Result<()> {
        let mut state = self.state.lock();
        state.ticks = ticks;
        state.enabled = true;
        drop(state);
        trace(
            &self.tx,
            HwEvent::Pwm {
                name: self.name,
                ticks,
            },
        );
        Ok(())
    }

    fn disable(&mut self) -> Result<()> {
        self.state.lock().enabled = false;
        trace(&self.tx, HwEvent::PwmOff { name: self.name });
        Ok(())
    }
}

/// Read-side handle to a [`MockPwm`]
#[derive(Clone)]
pub struct MockPwmProbe(Arc<Mutex<PwmState>>);

impl MockPwmProbe {
    /// Last commanded on-time in ticks
    pub fn ticks(&self) -> u16 {
        self.0.lock().ticks
    }

    pub fn is_enabled(&self) -> bool {
        self.0.lock().enabled
    }
}

/// Distance sensor that replays a script of readings, repeating the final
/// entry forever once the script runs dry. `None` entries simulate an echo
/// timeout.
pub struct ScriptedDistanceSensor {
    name: &'static str,
    script: VecDeque<Option<f64>>,
    current: Option<f64>,
    exhausted_as_timeout: bool,
    last: Option<f64>,
}

impl ScriptedDistanceSensor {
    /// Sensor that always reports the same clearance
    pub fn constant(name: &'static str, distance_cm: f64) -> Self {
        Self::scripted(name, vec![Some(distance_cm)])
    }

    pub fn scripted(name: &'static str, readings: Vec<Option<f64>>) -> Self {
        Self {
            name,
            script: readings.into(),
            current: None,
            exhausted_as_timeout: false,
            last: None,
        }
    }
}

impl DistanceSensor for ScriptedDistanceSensor {
    fn name(&self) -> &'static str {
        self.name
    }

    fn measure(&mut self) -> Result<f64> {
        if let Some(next) = self.script.pop_front() {
            self.current = next;
            self.exhausted_as_timeout = next.is_none();
        }
        match self.current {
            Some(cm) if !self.exhausted_as_timeout => {
                self.last = Some(cm);
                Ok(cm)
            }
            _ => Err(Error::SensorTimeout {
                sensor: self.name,
                edge: "rise",
            }),
        }
    }

    fn last_distance(&self) -> Option<f64> {
        self.last
    }
}

/// Distance sensor whose reading tests can change while the control loop
/// runs on another thread. `None` simulates an echo timeout.
pub struct SharedDistanceSensor {
    name: &'static str,
    value: Arc<Mutex<Option<f64>>>,
    last: Option<f64>,
}

impl SharedDistanceSensor {
    pub fn new(name: &'static str, initial_cm: f64) -> Self {
        Self {
            name,
            value: Arc::new(Mutex::new(Some(initial_cm))),
            last: None,
        }
    }

    /// Write-side handle kept by the test
    pub fn handle(&self) -> SharedDistanceHandle {
        SharedDistanceHandle(Arc::clone(&self.value))
    }
}

/// Handle for driving a [`SharedDistanceSensor`] from outside
#[derive(Clone)]
pub struct SharedDistanceHandle(Arc<Mutex<Option<f64>>>);

impl SharedDistanceHandle {
    pub fn set_distance(&self, cm: f64) {
        *self.0.lock() = Some(cm);
    }

    pub fn set_failing(&self) {
        *self.0.lock() = None;
    }
}

impl DistanceSensor for SharedDistanceSensor {
    fn name(&self) -> &'static str {
        self.name
    }

    fn measure(&mut self) -> Result<f64> {
        match *self.value.lock() {
            Some(cm) => {
                self.last = Some(cm);
                Ok(cm)
            }
            None => Err(Error::SensorTimeout {
                sensor: self.name,
                edge: "rise",
            }),
        }
    }

    fn last_distance(&self) -> Option<f64> {
        self.last
    }
}

/// Mock color sensor reporting an externally settable RGB triple
pub struct MockRgbSensor {
    value: Arc<Mutex<(u8, u8, u8)>>,
}

impl MockRgbSensor {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self {
            value: Arc::new(Mutex::new((r, g, b))),
        }
    }

    pub fn handle(&self) -> MockRgbHandle {
        MockRgbHandle(Arc::clone(&self.value))
    }
}

/// Handle for driving a [`MockRgbSensor`] from outside
#[derive(Clone)]
pub struct MockRgbHandle(Arc<Mutex<(u8, u8, u8)>>);

impl MockRgbHandle {
    pub fn set_color(&self, r: u8, g: u8, b: u8) {
        *self.0.lock() = (r, g, b);
    }
}

impl RgbSensor for MockRgbSensor {
    fn read_rgb(&mut self) -> Result<(u8, u8, u8)> {
        Ok(*self.value.lock())
    }
}

fn mock_motor_channel(
    pin_a: &'static str,
    pin_b: &'static str,
    enable: &'static str,
) -> MotorChannel {
    MotorChannel::new(
        Box::new(MockPin::new(pin_a)),
        Box::new(MockPin::new(pin_b)),
        Box::new(MockPwm::new(enable)),
    )
}

/// Assemble a full simulation backend from the configured constant
/// distances
pub fn create_mock_hardware(config: &CarConfig) -> HardwareSet {
    let hw = &config.hardware;
    HardwareSet {
        drive: DriveMotors::new(
            mock_motor_channel("m0a", "m0b", "m0en"),
            mock_motor_channel("m1a", "m1b", "m1en"),
        ),
        steering: SteeringServo::new(Box::new(MockPwm::new("steering")), &config.steering),
        front: Box::new(ScriptedDistanceSensor::constant("front", hw.mock_front_cm)),
        left: Box::new(ScriptedDistanceSensor::constant("left", hw.mock_left_cm)),
        right: Box::new(ScriptedDistanceSensor::constant("right", hw.mock_right_cm)),
        rgb: Box::new(MockRgbSensor::new(128, 128, 128)),
        // High level = light surface under the sensor
        line_input: Box::new(MockLevelInput::new(true)),
    }
}
