//! Steering servo on a PCA9685 channel
//!
//! One interpolation maps angles to pulse ticks for both command domains:
//! relative degrees in [-50, 50] interpolate center↔extreme, absolute
//! degrees in [0, 180] interpolate min↔max. Both domains therefore agree
//! at the physical endpoints of the calibration.

use crate::config::SteeringConfig;
use crate::error::Result;
use crate::hw::PwmChannel;

/// Which angle convention a steering command uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AngleDomain {
    /// Degrees relative to straight-ahead, negative = left, in [-50, 50]
    Relative,
    /// Absolute servo degrees in [0, 180]
    Absolute,
}

/// Position-controlled steering servo
pub struct SteeringServo {
    channel: Box<dyn PwmChannel>,
    pwm_min: u16,
    pwm_center: u16,
    pwm_max: u16,
}

impl SteeringServo {
    pub fn new(channel: Box<dyn PwmChannel>, cal: &SteeringConfig) -> Self {
        Self {
            channel,
            pwm_min: cal.pwm_min,
            pwm_center: cal.pwm_center,
            pwm_max: cal.pwm_max,
        }
    }

    /// Map an angle to a pulse width in ticks, clamping to the domain
    /// bounds first. Monotonically increasing in the angle within each
    /// domain.
    pub fn angle_to_pulse(&self, angle: f64, domain: AngleDomain) -> u16 {
        let (min, center, max) = (
            self.pwm_min as f64,
            self.pwm_center as f64,
            self.pwm_max as f64,
        );
        let pulse = match domain {
            AngleDomain::Relative => {
                let angle = angle.clamp(-50.0, 50.0);
                if angle >= 0.0 {
                    center + angle / 50.0 * (max - center)
                } else {
                    center + angle / 50.0 * (center - min)
                }
            }
            AngleDomain::Absolute => {
                let angle = angle.clamp(0.0, 180.0);
                min + angle / 180.0 * (max - min)
            }
        };
        pulse.round() as u16
    }

    /// Steer by a relative angle (negative = left)
    pub fn rotate(&mut self, degrees: f64) -> Result<()> {
        let ticks = self.angle_to_pulse(degrees, AngleDomain::Relative);
        self.channel.set_ticks(ticks)
    }

    /// Move the servo to an absolute angle
    pub fn set_absolute(&mut self, degrees: f64) -> Result<()> {
        let ticks = self.angle_to_pulse(degrees, AngleDomain::Absolute);
        self.channel.set_ticks(ticks)
    }

    /// Straighten the wheels (calibrated center tick)
    pub fn center(&mut self) -> Result<()> {
        self.channel.set_ticks(self.pwm_center)
    }

    /// Cut the pulse so the servo stops holding position
    pub fn disable(&mut self) -> Result<()> {
        self.channel.disable()
    }
}
