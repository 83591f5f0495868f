//! The avoidance control loop
//!
//! One cycle reads the three rangefinders serially, classifies the
//! situation and executes the matching maneuver to completion before the
//! next cycle. Every wait goes through [`ControlLoop::pause`], which
//! watches the cancel flag, so a stop request interrupts a maneuver
//! mid-wait; `run` always leaves the actuators in a safe resting state on
//! the way out, whatever the reason for exiting.

use crate::actuators::{DriveMotors, SteeringServo};
use crate::config::NavConfig;
use crate::error::Result;
use crate::nav::controller::Telemetry;
use crate::nav::speed::SpeedModel;
use crate::nav::{classify, VehicleState};
use crate::sensors::DistanceSensor;
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
enum Side {
    Left,
    Right,
}

/// Owns the actuators and rangefinders and runs the avoidance cycle
pub struct ControlLoop {
    nav: NavConfig,
    drive: DriveMotors,
    steering: SteeringServo,
    front: Box<dyn DistanceSensor>,
    left: Box<dyn DistanceSensor>,
    right: Box<dyn DistanceSensor>,
    speed: SpeedModel,
    state: VehicleState,
    telemetry: Arc<Telemetry>,
    cancel: Arc<AtomicBool>,
}

impl ControlLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        nav: NavConfig,
        drive: DriveMotors,
        steering: SteeringServo,
        front: Box<dyn DistanceSensor>,
        left: Box<dyn DistanceSensor>,
        right: Box<dyn DistanceSensor>,
        telemetry: Arc<Telemetry>,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            nav,
            drive,
            steering,
            front,
            left,
            right,
            speed: SpeedModel::default(),
            state: VehicleState::Cruising,
            telemetry,
            cancel,
        }
    }

    pub fn state(&self) -> VehicleState {
        self.state
    }

    pub(crate) fn actuators_mut(&mut self) -> (&mut DriveMotors, &mut SteeringServo) {
        (&mut self.drive, &mut self.steering)
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Sleep for `seconds`, waking early when cancelled. Returns false if
    /// the wait was interrupted.
    pub(crate) fn pause(&self, seconds: f64) -> bool {
        let deadline = Instant::now() + Duration::from_secs_f64(seconds.max(0.0));
        loop {
            if self.cancelled() {
                return false;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return true;
            }
            std::thread::sleep(remaining.min(Duration::from_millis(20)));
        }
    }

    /// Transient failures (echo timeout, out-of-range echo) become `None`
    /// and the classifier's fail policy takes over; anything else is a
    /// hardware fault and aborts the loop.
    fn read_sensor(sensor: &mut dyn DistanceSensor) -> Result<Option<f64>> {
        match sensor.measure() {
            Ok(cm) => Ok(Some(cm)),
            Err(e) if e.is_sensor_transient() => {
                warn!("{} sensor read failed: {}", sensor.name(), e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// One control cycle: measure, classify, maneuver. Returns the state
    /// the cycle classified. Sensor reads are serialized (front, left,
    /// right) since the ultrasonic bursts interfere.
    pub fn cycle(&mut self) -> Result<VehicleState> {
        let front = Self::read_sensor(self.front.as_mut())?;
        if let Some(cm) = front {
            self.telemetry.set_front(cm);
        }
        let left = Self::read_sensor(self.left.as_mut())?;
        if let Some(cm) = left {
            self.telemetry.set_left(cm);
        }
        let right = Self::read_sensor(self.right.as_mut())?;
        if let Some(cm) = right {
            self.telemetry.set_right(cm);
        }

        let state = classify(front, left, right, &self.nav);
        if state != self.state {
            debug!(
                "State {:?} -> {:?} (front {:?}, left {:?}, right {:?})",
                self.state, state, front, left, right
            );
        }
        self.state = state;

        match state {
            VehicleState::Cruising => self.handle_cruising()?,
            VehicleState::Emergency => self.handle_emergency()?,
            VehicleState::AvoidFront => self.handle_avoid_front()?,
            VehicleState::AvoidBoth => self.handle_avoid_both()?,
            VehicleState::AvoidLeft => self.handle_avoid_side(Side::Left)?,
            VehicleState::AvoidRight => self.handle_avoid_side(Side::Right)?,
        }
        Ok(state)
    }

    fn handle_cruising(&mut self) -> Result<()> {
        self.steering.center()?;
        self.drive.forward(self.nav.forward_speed_pct)?;
        let speed = self.speed.ramp_up();
        self.telemetry.set_speed(speed);
        Ok(())
    }

    fn handle_emergency(&mut self) -> Result<()> {
        warn!(
            "Emergency: obstacle inside {} cm, full stop",
            self.nav.emergency_threshold_cm
        );
        // Longer reverse than a plain front avoid
        self.back_off_and_turn(1.5)
    }

    fn handle_avoid_front(&mut self) -> Result<()> {
        info!("Obstacle ahead, backing off");
        self.back_off_and_turn(1.0)
    }

    /// Stop, reverse for `reverse_factor` times the configured duration,
    /// then turn toward whichever side now has more clearance and resume.
    fn back_off_and_turn(&mut self, reverse_factor: f64) -> Result<()> {
        self.drive.stop()?;
        self.speed.reset();
        self.telemetry.set_speed(0.0);
        if !self.pause(self.nav.reverse_pause_s) {
            return Ok(());
        }
        self.drive.backward(self.nav.reverse_speed_pct)?;
        if !self.pause(reverse_factor * self.nav.reverse_duration_s) {
            return Ok(());
        }
        self.drive.stop()?;

        let (left, right) = self.measure_sides()?;
        let angle = self.pick_turn(left, right);
        self.steering.rotate(angle)?;
        self.drive.forward(self.nav.forward_speed_pct)?;
        if !self.pause(self.nav.turn_duration_s) {
            return Ok(());
        }
        self.steering.center()
    }

    fn handle_avoid_both(&mut self) -> Result<()> {
        info!("Obstacles on both sides, reversing");
        self.speed.reset();
        self.telemetry.set_speed(0.0);
        self.drive.backward(self.nav.reverse_speed_pct)?;
        if !self.pause(self.nav.reverse_duration_s) {
            return Ok(());
        }

        // Keep reversing until a side clears, bounded by the retry budget
        let (mut left, mut right) = self.measure_sides()?;
        let mut attempts = 0;
        while self.both_blocked(left, right) && attempts < self.nav.avoid_retry_budget {
            if !self.pause(self.nav.cycle_period_s) {
                return Ok(());
            }
            let sides = self.measure_sides()?;
            left = sides.0;
            right = sides.1;
            attempts += 1;
        }
        if self.both_blocked(left, right) {
            warn!(
                "Both sides still blocked after {} rechecks, turning toward larger clearance",
                attempts
            );
        }
        self.drive.stop()?;

        let left_clear = left >= self.nav.side_threshold_cm;
        let right_clear = right >= self.nav.side_threshold_cm;
        let angle = match (left_clear, right_clear) {
            (true, false) => self.nav.turn_angle_left,
            (false, true) => self.nav.turn_angle_right,
            _ => self.pick_turn(left, right),
        };
        self.steering.rotate(angle)?;
        self.drive.forward(self.nav.forward_speed_pct)?;
        if !self.pause(self.nav.turn_duration_s) {
            return Ok(());
        }
        self.steering.center()
    }

    /// Steer away from the blocked side without slowing down
    fn handle_avoid_side(&mut self, side: Side) -> Result<()> {
        let (label, angle) = match side {
            Side::Left => ("left", self.nav.turn_angle_right),
            Side::Right => ("right", self.nav.turn_angle_left),
        };
        info!("Obstacle on the {} side, steering away", label);
        self.steering.rotate(angle)?;
        if !self.pause(self.nav.turn_duration_s) {
            return Ok(());
        }
        self.steering.center()
    }

    fn both_blocked(&self, left: f64, right: f64) -> bool {
        left < self.nav.side_threshold_cm && right < self.nav.side_threshold_cm
    }

    /// Re-measure both sides, failing open: an unreadable side counts as
    /// unlimited clearance.
    fn measure_sides(&mut self) -> Result<(f64, f64)> {
        let left = Self::read_sensor(self.left.as_mut())?.unwrap_or(f64::INFINITY);
        let right = Self::read_sensor(self.right.as_mut())?.unwrap_or(f64::INFINITY);
        Ok((left, right))
    }

    /// Turn angle toward the larger clearance; ties (within the epsilon)
    /// go left.
    fn pick_turn(&self, left: f64, right: f64) -> f64 {
        if right > left + self.nav.side_epsilon_cm {
            self.nav.turn_angle_right
        } else {
            self.nav.turn_angle_left
        }
    }

    /// Run cycles until cancelled or a hardware fault surfaces. The
    /// actuators are left stopped, centered and de-energized on exit
    /// either way.
    pub fn run(&mut self) -> Result<()> {
        info!("Avoidance loop starting");
        let result = self.run_cycles();
        self.safe_stop();
        match &result {
            Ok(()) => info!("Avoidance loop stopped"),
            Err(e) => error!("Avoidance loop aborted: {}", e),
        }
        result
    }

    fn run_cycles(&mut self) -> Result<()> {
        self.steering.center()?;
        self.drive.forward(self.nav.forward_speed_pct)?;
        while !self.cancelled() {
            self.cycle()?;
            if !self.pause(self.nav.cycle_period_s) {
                break;
            }
        }
        Ok(())
    }

    /// Best-effort transition to the resting state; errors are logged, not
    /// propagated, so one dead actuator cannot keep another energized.
    pub fn safe_stop(&mut self) {
        if let Err(e) = self.drive.stop() {
            error!("Drive stop failed during shutdown: {}", e);
        }
        self.speed.reset();
        self.telemetry.set_speed(0.0);
        if let Err(e) = self.steering.center() {
            error!("Steering center failed during shutdown: {}", e);
        }
        if let Err(e) = self.steering.disable() {
            error!("Steering disable failed during shutdown: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuators::drive::MotorChannel;
    use crate::config::CarConfig;
    use crate::hw::mock::{MockPin, MockPinProbe, MockPwm, MockPwmProbe, ScriptedDistanceSensor};

    struct Rig {
        control: ControlLoop,
        m0_pin_a: MockPinProbe,
        m0_enable: MockPwmProbe,
        steering: MockPwmProbe,
        cancel: Arc<AtomicBool>,
    }

    /// Control loop over mock hardware with all durations collapsed
    fn rig(front_cm: f64, left_cm: f64, right_cm: f64) -> Rig {
        let mut config = CarConfig::default();
        config.nav.turn_duration_s = 0.0;
        config.nav.reverse_duration_s = 0.0;
        config.nav.reverse_pause_s = 0.0;
        config.nav.cycle_period_s = 0.0;
        config.nav.avoid_retry_budget = 3;

        let pin_a = MockPin::new("m0a");
        let enable = MockPwm::new("m0en");
        let m0_pin_a = pin_a.probe();
        let m0_enable = enable.probe();
        let motor0 = MotorChannel::new(
            Box::new(pin_a),
            Box::new(MockPin::new("m0b")),
            Box::new(enable),
        );
        let motor1 = MotorChannel::new(
            Box::new(MockPin::new("m1a")),
            Box::new(MockPin::new("m1b")),
            Box::new(MockPwm::new("m1en")),
        );
        let steering_pwm = MockPwm::new("steering");
        let steering_probe = steering_pwm.probe();

        let cancel = Arc::new(AtomicBool::new(false));
        let control = ControlLoop::new(
            config.nav.clone(),
            DriveMotors::new(motor0, motor1),
            SteeringServo::new(Box::new(steering_pwm), &config.steering),
            Box::new(ScriptedDistanceSensor::constant("front", front_cm)),
            Box::new(ScriptedDistanceSensor::constant("left", left_cm)),
            Box::new(ScriptedDistanceSensor::constant("right", right_cm)),
            Arc::new(Telemetry::new()),
            Arc::clone(&cancel),
        );
        Rig {
            control,
            m0_pin_a,
            m0_enable,
            steering: steering_probe,
            cancel,
        }
    }

    #[test]
    fn test_cruising_cycle_drives_forward_centered() {
        let mut rig = rig(200.0, 200.0, 200.0);
        let state = rig.control.cycle().unwrap();
        assert_eq!(state, VehicleState::Cruising);
        assert!(rig.m0_pin_a.is_high());
        assert_eq!(rig.m0_enable.ticks(), 4095);
        assert_eq!(rig.steering.ticks(), 320);
    }

    #[test]
    fn test_emergency_ends_in_forward_motion() {
        let mut rig = rig(5.0, 200.0, 200.0);
        let state = rig.control.cycle().unwrap();
        assert_eq!(state, VehicleState::Emergency);
        // Maneuver ran to completion: forward again, wheels recentered
        assert!(rig.m0_pin_a.is_high());
        assert_eq!(rig.m0_enable.ticks(), 4095);
        assert_eq!(rig.steering.ticks(), 320);
    }

    #[test]
    fn test_avoid_both_terminates_when_sides_never_clear() {
        // Both sides permanently blocked: the retry budget must bound the
        // maneuver and the tie must resolve to a left turn
        let mut rig = rig(200.0, 5.0, 5.0);
        let state = rig.control.cycle().unwrap();
        assert_eq!(state, VehicleState::AvoidBoth);
        assert!(rig.m0_pin_a.is_high());
        assert_eq!(rig.steering.ticks(), 320);
    }

    #[test]
    fn test_avoid_left_steers_right_then_recenters() {
        let mut config = CarConfig::default();
        config.nav.turn_duration_s = 0.0;

        let (tx, rx) = crossbeam_channel::unbounded();
        let steering_pwm = MockPwm::traced("steering", tx);
        let motor0 = MotorChannel::new(
            Box::new(MockPin::new("m0a")),
            Box::new(MockPin::new("m0b")),
            Box::new(MockPwm::new("m0en")),
        );
        let motor1 = MotorChannel::new(
            Box::new(MockPin::new("m1a")),
            Box::new(MockPin::new("m1b")),
            Box::new(MockPwm::new("m1en")),
        );
        let mut control = ControlLoop::new(
            config.nav.clone(),
            DriveMotors::new(motor0, motor1),
            SteeringServo::new(Box::new(steering_pwm), &config.steering),
            Box::new(ScriptedDistanceSensor::constant("front", 200.0)),
            Box::new(ScriptedDistanceSensor::constant("left", 5.0)),
            Box::new(ScriptedDistanceSensor::constant("right", 200.0)),
            Arc::new(Telemetry::new()),
            Arc::new(AtomicBool::new(false)),
        );
        let state = control.cycle().unwrap();
        assert_eq!(state, VehicleState::AvoidLeft);

        // turn_angle_right (+40 deg) maps above center, then recenter
        let ticks: Vec<u16> = rx
            .try_iter()
            .filter_map(|e| match e {
                crate::hw::mock::HwEvent::Pwm { name: "steering", ticks } => Some(ticks),
                _ => None,
            })
            .collect();
        assert_eq!(ticks, vec![464, 320]);
    }

    #[test]
    fn test_cancelled_run_leaves_safe_state() {
        let mut rig = rig(200.0, 200.0, 200.0);
        rig.cancel.store(true, Ordering::SeqCst);
        rig.control.run().unwrap();
        assert_eq!(rig.m0_enable.ticks(), 0);
        assert!(!rig.steering.is_enabled());
    }

    #[test]
    fn test_front_sensor_failure_goes_emergency() {
        let mut config = CarConfig::default();
        config.nav.turn_duration_s = 0.0;
        config.nav.reverse_duration_s = 0.0;
        config.nav.reverse_pause_s = 0.0;

        let motor0 = MotorChannel::new(
            Box::new(MockPin::new("m0a")),
            Box::new(MockPin::new("m0b")),
            Box::new(MockPwm::new("m0en")),
        );
        let motor1 = MotorChannel::new(
            Box::new(MockPin::new("m1a")),
            Box::new(MockPin::new("m1b")),
            Box::new(MockPwm::new("m1en")),
        );
        let mut control = ControlLoop::new(
            config.nav.clone(),
            DriveMotors::new(motor0, motor1),
            SteeringServo::new(Box::new(MockPwm::new("steering")), &config.steering),
            Box::new(ScriptedDistanceSensor::scripted("front", vec![None])),
            Box::new(ScriptedDistanceSensor::constant("left", 200.0)),
            Box::new(ScriptedDistanceSensor::constant("right", 200.0)),
            Arc::new(Telemetry::new()),
            Arc::new(AtomicBool::new(false)),
        );
        let state = control.cycle().unwrap();
        assert_eq!(state, VehicleState::Emergency);
    }
}
