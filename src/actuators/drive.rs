//! Differential drive through a dual H-bridge
//!
//! Each of the two motor channels has a PWM enable input and two direction
//! lines. Speed commands are signed percentages: sign selects the
//! direction-line polarity, magnitude scales to a 12-bit duty. Direction
//! lines are always written before the duty so the bridge never sees a
//! stale polarity at speed.

use crate::error::{Error, Result};
use crate::hw::{DigitalOutput, PwmChannel};

/// Full-scale PWM on-time (12-bit)
pub const DUTY_MAX: u16 = 4095;

/// Signed speed percentage to PWM ticks
fn scale_speed(percent: i8) -> u16 {
    let magnitude = percent.unsigned_abs().min(100) as u32;
    (magnitude * DUTY_MAX as u32 / 100) as u16
}

/// One H-bridge channel: two direction lines plus a PWM enable
pub struct MotorChannel {
    pin_a: Box<dyn DigitalOutput>,
    pin_b: Box<dyn DigitalOutput>,
    enable: Box<dyn PwmChannel>,
}

impl MotorChannel {
    pub fn new(
        pin_a: Box<dyn DigitalOutput>,
        pin_b: Box<dyn DigitalOutput>,
        enable: Box<dyn PwmChannel>,
    ) -> Self {
        Self {
            pin_a,
            pin_b,
            enable,
        }
    }

    /// Commit a direction and duty to the bridge. Forward polarity is
    /// `pin_a` high / `pin_b` low; anything non-positive rests at the
    /// opposite polarity with whatever duty was requested.
    fn apply(&mut self, forward: bool, duty: u16) -> Result<()> {
        self.pin_a.write(forward);
        self.pin_b.write(!forward);
        self.enable.set_ticks(duty)
    }

    fn release(&mut self) -> Result<()> {
        self.pin_a.set_low();
        self.pin_b.set_low();
        self.enable.disable()
    }
}

/// Both drive motors, commanded together or differentially
pub struct DriveMotors {
    channels: [MotorChannel; 2],
}

impl DriveMotors {
    pub fn new(motor0: MotorChannel, motor1: MotorChannel) -> Self {
        Self {
            channels: [motor0, motor1],
        }
    }

    /// Command both channels to the same signed speed. Out-of-range values
    /// saturate.
    pub fn set_speed(&mut self, percent: i8) -> Result<()> {
        let percent = percent.clamp(-100, 100);
        let duty = scale_speed(percent);
        for channel in &mut self.channels {
            channel.apply(percent > 0, duty)?;
        }
        Ok(())
    }

    /// Drive forward at `percent` (must be non-negative)
    pub fn forward(&mut self, percent: i8) -> Result<()> {
        if percent < 0 {
            return Err(Error::InvalidCommand(format!(
                "forward() takes a non-negative speed, got {}",
                percent
            )));
        }
        self.set_speed(percent)
    }

    /// Drive backward at `percent` (must be negative)
    pub fn backward(&mut self, percent: i8) -> Result<()> {
        if percent >= 0 {
            return Err(Error::InvalidCommand(format!(
                "backward() takes a negative speed, got {}",
                percent
            )));
        }
        self.set_speed(percent)
    }

    /// Zero duty on both channels, direction lines at the backward resting
    /// polarity
    pub fn stop(&mut self) -> Result<()> {
        self.set_speed(0)
    }

    /// Spin the chassis about its own axis: the channels get opposite
    /// signs, `percent > 0` spins one way, negative the other.
    pub fn differential_rotate(&mut self, percent: i8) -> Result<()> {
        let percent = percent.clamp(-100, 100);
        let duty = scale_speed(percent);
        self.channels[0].apply(percent > 0, duty)?;
        self.channels[1].apply(percent < 0, duty)?;
        Ok(())
    }

    /// Cut PWM entirely and drop both direction lines on both channels
    pub fn release(&mut self) -> Result<()> {
        for channel in &mut self.channels {
            channel.release()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::mock::{MockPin, MockPinProbe, MockPwm, MockPwmProbe};

    struct Probes {
        pin_a: MockPinProbe,
        pin_b: MockPinProbe,
        enable: MockPwmProbe,
    }

    fn probed_channel() -> (MotorChannel, Probes) {
        let pin_a = MockPin::new("a");
        let pin_b = MockPin::new("b");
        let enable = MockPwm::new("en");
        let probes = Probes {
            pin_a: pin_a.probe(),
            pin_b: pin_b.probe(),
            enable: enable.probe(),
        };
        (
            MotorChannel::new(Box::new(pin_a), Box::new(pin_b), Box::new(enable)),
            probes,
        )
    }

    fn probed_drive() -> (DriveMotors, Probes, Probes) {
        let (m0, p0) = probed_channel();
        let (m1, p1) = probed_channel();
        (DriveMotors::new(m0, m1), p0, p1)
    }

    #[test]
    fn test_forward_polarity_and_duty() {
        let (mut drive, p0, p1) = probed_drive();
        drive.forward(100).unwrap();
        for p in [&p0, &p1] {
            assert!(p.pin_a.is_high());
            assert!(!p.pin_b.is_high());
            assert_eq!(p.enable.ticks(), DUTY_MAX);
        }
    }

    #[test]
    fn test_duty_scaling() {
        let (mut drive, p0, _) = probed_drive();
        drive.forward(50).unwrap();
        assert_eq!(p0.enable.ticks(), (50 * DUTY_MAX as u32 / 100) as u16);
        drive.forward(0).unwrap();
        assert_eq!(p0.enable.ticks(), 0);
    }

    #[test]
    fn test_stop_matches_zero_speed() {
        let (mut drive, p0, p1) = probed_drive();
        drive.forward(100).unwrap();
        drive.stop().unwrap();
        for p in [&p0, &p1] {
            assert_eq!(p.enable.ticks(), 0);
            // Resting polarity is the backward one
            assert!(!p.pin_a.is_high());
            assert!(p.pin_b.is_high());
        }

        let (mut drive2, q0, _) = probed_drive();
        drive2.set_speed(0).unwrap();
        assert_eq!(q0.enable.ticks(), 0);
        assert!(!q0.pin_a.is_high());
        assert!(q0.pin_b.is_high());
    }

    #[test]
    fn test_direction_lines_always_complementary() {
        let (mut drive, p0, p1) = probed_drive();
        for speed in [-100i8, -37, 0, 1, 64, 100] {
            drive.set_speed(speed).unwrap();
            for p in [&p0, &p1] {
                assert_ne!(p.pin_a.is_high(), p.pin_b.is_high());
            }
        }
    }

    #[test]
    fn test_backward_rejects_non_negative() {
        let (mut drive, _, _) = probed_drive();
        assert!(matches!(
            drive.backward(0),
            Err(Error::InvalidCommand(_))
        ));
        assert!(matches!(
            drive.backward(50),
            Err(Error::InvalidCommand(_))
        ));
        drive.backward(-100).unwrap();
    }

    #[test]
    fn test_forward_rejects_negative() {
        let (mut drive, _, _) = probed_drive();
        assert!(matches!(
            drive.forward(-1),
            Err(Error::InvalidCommand(_))
        ));
    }

    #[test]
    fn test_differential_rotate_opposes_channels() {
        let (mut drive, p0, p1) = probed_drive();
        drive.differential_rotate(100).unwrap();
        assert!(p0.pin_a.is_high());
        assert!(!p0.pin_b.is_high());
        assert!(!p1.pin_a.is_high());
        assert!(p1.pin_b.is_high());
        assert_eq!(p0.enable.ticks(), DUTY_MAX);
        assert_eq!(p1.enable.ticks(), DUTY_MAX);

        drive.differential_rotate(-100).unwrap();
        assert!(!p0.pin_a.is_high());
        assert!(p1.pin_a.is_high());
    }

    #[test]
    fn test_release_cuts_everything() {
        let (mut drive, p0, _) = probed_drive();
        drive.forward(100).unwrap();
        drive.release().unwrap();
        assert!(!p0.pin_a.is_high());
        assert!(!p0.pin_b.is_high());
        assert!(!p0.enable.is_enabled());
    }
}
