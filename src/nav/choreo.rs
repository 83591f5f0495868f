//! Demonstration choreographies
//!
//! Scripted figures built on the same actuator APIs as the avoidance
//! maneuvers. They borrow the actuators through the controller, so they
//! are refused while the avoidance loop is active and they honor the
//! cancel flag mid-figure.

use crate::error::Result;
use crate::nav::control_loop::ControlLoop;
use crate::nav::controller::NavController;
use log::info;

pub const DEFAULT_SPIN_DURATION_S: f64 = 10.0;
pub const DEFAULT_SPIN_SPEED_PCT: i8 = 100;
pub const DEFAULT_EIGHT_LAPS: u32 = 2;
pub const DEFAULT_EIGHT_ARC_S: f64 = 3.0;
pub const DEFAULT_EIGHT_SPEED_PCT: i8 = 100;

/// Spin the chassis about its own axis for `duration_s`
pub fn spin_in_place(control: &mut ControlLoop, duration_s: f64, speed_pct: i8) -> Result<()> {
    info!("Spinning in place for {:.1} s", duration_s);
    {
        let (drive, steering) = control.actuators_mut();
        steering.center()?;
        drive.differential_rotate(speed_pct)?;
    }
    if !control.pause(duration_s) {
        info!("Spin cancelled");
    }
    control.safe_stop();
    Ok(())
}

/// Drive a figure eight: forward motion with alternating full steering
/// locks, one left and one right arc per lap
pub fn figure_eight(
    control: &mut ControlLoop,
    laps: u32,
    arc_duration_s: f64,
    speed_pct: i8,
) -> Result<()> {
    info!("Driving a figure eight ({} laps)", laps);
    control.actuators_mut().0.forward(speed_pct)?;
    'laps: for _ in 0..laps {
        for angle in [-50.0, 50.0] {
            control.actuators_mut().1.rotate(angle)?;
            if !control.pause(arc_duration_s) {
                info!("Figure eight cancelled");
                break 'laps;
            }
        }
    }
    control.safe_stop();
    Ok(())
}

impl NavController {
    /// Spin in place on the caller's thread; refused while the avoidance
    /// loop is active
    pub fn spin_in_place(&self, duration_s: f64, speed_pct: i8) -> Result<()> {
        self.with_actuators("spin", |control| {
            spin_in_place(control, duration_s, speed_pct)
        })
    }

    /// Figure eight on the caller's thread; refused while the avoidance
    /// loop is active
    pub fn figure_eight(&self, laps: u32, arc_duration_s: f64, speed_pct: i8) -> Result<()> {
        self.with_actuators("figure eight", |control| {
            figure_eight(control, laps, arc_duration_s, speed_pct)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuators::drive::MotorChannel;
    use crate::actuators::{DriveMotors, SteeringServo};
    use crate::config::CarConfig;
    use crate::hw::mock::{MockPin, MockPinProbe, MockPwm, MockPwmProbe, ScriptedDistanceSensor};
    use crate::nav::controller::Telemetry;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    struct Rig {
        control: ControlLoop,
        m0_pin_a: MockPinProbe,
        m1_pin_a: MockPinProbe,
        m0_enable: MockPwmProbe,
        steering: MockPwmProbe,
    }

    fn rig() -> Rig {
        let config = CarConfig::default();
        let m0a = MockPin::new("m0a");
        let m1a = MockPin::new("m1a");
        let m0en = MockPwm::new("m0en");
        let steering_pwm = MockPwm::new("steering");
        let m0_pin_a = m0a.probe();
        let m1_pin_a = m1a.probe();
        let m0_enable = m0en.probe();
        let steering = steering_pwm.probe();

        let motor0 = MotorChannel::new(
            Box::new(m0a),
            Box::new(MockPin::new("m0b")),
            Box::new(m0en),
        );
        let motor1 = MotorChannel::new(
            Box::new(m1a),
            Box::new(MockPin::new("m1b")),
            Box::new(MockPwm::new("m1en")),
        );
        let control = ControlLoop::new(
            config.nav.clone(),
            DriveMotors::new(motor0, motor1),
            SteeringServo::new(Box::new(steering_pwm), &config.steering),
            Box::new(ScriptedDistanceSensor::constant("front", 200.0)),
            Box::new(ScriptedDistanceSensor::constant("left", 200.0)),
            Box::new(ScriptedDistanceSensor::constant("right", 200.0)),
            Arc::new(Telemetry::new()),
            Arc::new(AtomicBool::new(false)),
        );
        Rig {
            control,
            m0_pin_a,
            m1_pin_a,
            m0_enable,
            steering,
        }
    }

    #[test]
    fn test_spin_parks_cleanly() {
        let mut rig = rig();
        spin_in_place(&mut rig.control, 0.0, 100).unwrap();
        assert_eq!(rig.m0_enable.ticks(), 0);
        assert!(!rig.steering.is_enabled());
    }

    #[test]
    fn test_spin_opposes_channels() {
        let mut rig = rig();
        // Zero-duration spins park immediately, so command the rotation
        // directly and inspect the polarity before parking
        rig.control.actuators_mut().0.differential_rotate(100).unwrap();
        assert!(rig.m0_pin_a.is_high());
        assert!(!rig.m1_pin_a.is_high());
    }

    #[test]
    fn test_figure_eight_parks_cleanly() {
        let mut rig = rig();
        figure_eight(&mut rig.control, 1, 0.0, 100).unwrap();
        assert_eq!(rig.m0_enable.ticks(), 0);
        assert!(!rig.steering.is_enabled());
        assert_eq!(rig.steering.ticks(), 320);
    }
}
