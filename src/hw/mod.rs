//! Hardware abstraction layer
//!
//! Everything above this module talks to pins and PWM channels through the
//! traits below, so the control logic is identical on the bench (mock
//! backend) and on the car (Raspberry Pi backend). `create_hardware`
//! dispatches on the configured backend name.

use crate::actuators::drive::DriveMotors;
use crate::actuators::steering::SteeringServo;
use crate::config::CarConfig;
use crate::error::{Error, Result};
use crate::sensors::rgb::RgbSensor;
use crate::sensors::DistanceSensor;

#[cfg(any(test, feature = "mock"))]
pub mod mock;
#[cfg(feature = "rpi")]
pub mod rpi;

/// A push-pull digital output line
pub trait DigitalOutput: Send {
    fn set_high(&mut self);
    fn set_low(&mut self);

    fn write(&mut self, high: bool) {
        if high {
            self.set_high();
        } else {
            self.set_low();
        }
    }
}

/// A digital input line
pub trait DigitalInput: Send {
    fn is_high(&self) -> bool;
}

/// One PWM output channel (12-bit duty, 0..=4095 ticks)
pub trait PwmChannel: Send {
    /// Set the on-time in ticks out of 4096
    fn set_ticks(&mut self, ticks: u16) -> Result<()>;

    /// Stop driving the channel entirely (full-off, no holding torque)
    fn disable(&mut self) -> Result<()>;
}

/// Everything the daemon needs from a backend, already assembled into the
/// high-level actuator and sensor types.
pub struct HardwareSet {
    pub drive: DriveMotors,
    pub steering: SteeringServo,
    pub front: Box<dyn DistanceSensor>,
    pub left: Box<dyn DistanceSensor>,
    pub right: Box<dyn DistanceSensor>,
    pub rgb: Box<dyn RgbSensor>,
    pub line_input: Box<dyn DigitalInput>,
}

/// Create the hardware set for the configured backend
pub fn create_hardware(config: &CarConfig) -> Result<HardwareSet> {
    match config.hardware.backend.as_str() {
        #[cfg(any(test, feature = "mock"))]
        "mock" => Ok(mock::create_mock_hardware(config)),
        #[cfg(feature = "rpi")]
        "rpi" => rpi::create_rpi_hardware(config),
        other => Err(Error::HardwareUnavailable(format!(
            "backend '{}' is not available in this build",
            other
        ))),
    }
}
