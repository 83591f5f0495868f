//! Error types for Ratha

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Ratha error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration is structurally valid but rejected at startup
    #[error("Invalid config: {0}")]
    Config(String),

    /// Echo edge never transitioned within the timeout bound
    #[error("Sensor '{sensor}' timed out waiting for echo {edge}")]
    SensorTimeout {
        /// Sensor name (front/left/right)
        sensor: &'static str,
        /// Which edge was awaited ("rise" or "fall")
        edge: &'static str,
    },

    /// Measured distance outside the configured valid bounds
    #[error("Sensor '{sensor}' reading out of range: {distance_cm:.1} cm")]
    SensorOutOfRange {
        /// Sensor name (front/left/right)
        sensor: &'static str,
        /// Offending distance in centimeters
        distance_cm: f64,
    },

    /// Actuator invoked outside its contract (programming error)
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// PWM/GPIO initialization or mid-loop hardware failure
    #[error("Hardware unavailable: {0}")]
    HardwareUnavailable(String),

    /// GPIO error
    #[cfg(feature = "rpi")]
    #[error("GPIO error: {0}")]
    Gpio(#[from] rppal::gpio::Error),

    /// I2C error
    #[cfg(feature = "rpi")]
    #[error("I2C error: {0}")]
    I2c(#[from] rppal::i2c::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for the transient sensor errors that the control loop
    /// recovers from locally (fail-open/fail-closed per navigation rules).
    pub fn is_sensor_transient(&self) -> bool {
        matches!(
            self,
            Error::SensorTimeout { .. } | Error::SensorOutOfRange { .. }
        )
    }
}
