//! Sensor drivers: ultrasonic rangefinders, color launch trigger,
//! line-crossing shutdown trigger

pub mod line;
pub mod rgb;
pub mod ultrasonic;

use crate::error::Result;

/// A filtered distance sensor
pub trait DistanceSensor: Send {
    /// Sensor name used in logs and errors ("front", "left", "right")
    fn name(&self) -> &'static str;

    /// Take one filtered measurement in centimeters
    fn measure(&mut self) -> Result<f64>;

    /// Most recent successful measurement, if any
    fn last_distance(&self) -> Option<f64>;
}
