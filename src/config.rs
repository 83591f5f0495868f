//! Configuration for the Ratha daemon
//!
//! Loads configuration from a TOML file. Defaults match the reference
//! chassis calibration (PCA9685 servo board at 60 Hz, HC-SR04 rangefinders).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Top-level daemon configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CarConfig {
    pub hardware: HardwareConfig,
    pub nav: NavConfig,
    pub sensors: SensorConfig,
    pub steering: SteeringConfig,
    pub drive: DriveConfig,
    pub launch: LaunchConfig,
    pub line: LineConfig,
    pub panel: PanelConfig,
    pub logging: LoggingConfig,
}

/// Hardware backend selection and bus/pin assignments (BCM numbering)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HardwareConfig {
    /// Backend: "mock" (simulation) or "rpi" (requires the `rpi` feature)
    pub backend: String,
    /// I2C bus carrying the PCA9685 and the color sensor
    pub i2c_bus: u8,
    /// PCA9685 board address
    pub pca9685_addr: u8,
    /// Front rangefinder pins
    pub front: SensorPins,
    /// Left rangefinder pins
    pub left: SensorPins,
    /// Right rangefinder pins
    pub right: SensorPins,
    /// Constant distances reported by the mock backend (cm)
    pub mock_front_cm: f64,
    pub mock_left_cm: f64,
    pub mock_right_cm: f64,
}

/// Trigger/echo pin pair for one ultrasonic sensor
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct SensorPins {
    pub trigger: u8,
    pub echo: u8,
}

/// Navigation thresholds, angles, durations and speeds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NavConfig {
    /// Side obstacle threshold (cm)
    pub side_threshold_cm: f64,
    /// Front obstacle threshold (cm)
    pub front_threshold_cm: f64,
    /// Front emergency threshold (cm); must not exceed the front threshold
    pub emergency_threshold_cm: f64,
    /// Relative steering angle for a left turn (degrees, negative)
    pub turn_angle_left: f64,
    /// Relative steering angle for a right turn (degrees, positive)
    pub turn_angle_right: f64,
    /// Absolute servo angle of the straight-ahead position (degrees)
    pub center_angle: f64,
    /// How long a turn is held (seconds)
    pub turn_duration_s: f64,
    /// How long a recovery reverse lasts (seconds)
    pub reverse_duration_s: f64,
    /// Pause between stopping and reversing (seconds)
    pub reverse_pause_s: f64,
    /// Cruising speed command (percent, 0..=100)
    pub forward_speed_pct: i8,
    /// Reversing speed command (percent, -100..=-1)
    pub reverse_speed_pct: i8,
    /// Control loop period (seconds)
    pub cycle_period_s: f64,
    /// Bounded recheck budget for the double-side maneuver (cycles)
    pub avoid_retry_budget: u32,
    /// Clearance difference below which both sides count as equal (cm)
    pub side_epsilon_cm: f64,
}

/// Ultrasonic sampling and validity bounds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SensorConfig {
    /// Raw samples averaged per measurement
    pub sample_count: u32,
    /// Delay between raw samples (seconds)
    pub sample_delay_s: f64,
    /// Lower validity bound, exclusive (cm)
    pub min_valid_cm: f64,
    /// Upper validity bound, inclusive (cm)
    pub max_valid_cm: f64,
    /// Bound on each wait for an echo edge (seconds)
    pub echo_timeout_s: f64,
}

/// Steering servo calibration (PCA9685 ticks at 60 Hz)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SteeringConfig {
    /// PWM channel driving the servo
    pub channel: u8,
    /// Tick value at full left lock
    pub pwm_min: u16,
    /// Tick value with the wheels straight
    pub pwm_center: u16,
    /// Tick value at full right lock
    pub pwm_max: u16,
}

/// Drive motor channel assignments
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DriveConfig {
    /// PWM frequency for the motor enable channels (Hz)
    pub pwm_frequency_hz: u16,
    pub motor0: MotorPins,
    pub motor1: MotorPins,
}

/// One H-bridge channel: PWM enable plus two direction lines
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct MotorPins {
    /// PCA9685 channel feeding the bridge enable input
    pub enable_channel: u8,
    /// Forward direction line
    pub pin_a: u8,
    /// Backward direction line
    pub pin_b: u8,
}

/// Color-based launch trigger
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LaunchConfig {
    /// Per-channel deviation from the calibrated reference that counts
    /// as a color event
    pub threshold: u8,
    /// Sensor integration time (milliseconds)
    pub integration_time_ms: u16,
    /// Ambient calibration duration (seconds)
    pub calibration_duration_s: f64,
    /// Monitor poll interval (seconds)
    pub poll_interval_s: f64,
}

/// Line-crossing shutdown trigger
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LineConfig {
    /// Digital input pin of the line sensor
    pub pin: u8,
    /// Dark detections before shutdown
    pub max_triggers: u32,
    /// Grace pause after the first detection (seconds)
    pub grace_pause_s: f64,
    /// Monitor poll interval (seconds)
    pub poll_interval_s: f64,
}

/// HTTP control panel
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PanelConfig {
    /// TCP bind address, e.g. `0.0.0.0:8080`
    pub bind_address: String,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl CarConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: CarConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("serialize: {}", e)))?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Startup validation of cross-field invariants.
    ///
    /// An inverted emergency/front threshold pair is rejected here rather
    /// than silently reordered.
    pub fn validate(&self) -> Result<()> {
        let nav = &self.nav;
        if nav.emergency_threshold_cm > nav.front_threshold_cm {
            return Err(Error::Config(format!(
                "emergency_threshold_cm ({}) must not exceed front_threshold_cm ({})",
                nav.emergency_threshold_cm, nav.front_threshold_cm
            )));
        }
        if !(0..=100).contains(&nav.forward_speed_pct) {
            return Err(Error::Config(format!(
                "forward_speed_pct must be in 0..=100, got {}",
                nav.forward_speed_pct
            )));
        }
        if !(-100..0).contains(&(nav.reverse_speed_pct as i32)) {
            return Err(Error::Config(format!(
                "reverse_speed_pct must be in -100..=-1, got {}",
                nav.reverse_speed_pct
            )));
        }
        if nav.cycle_period_s <= 0.0 {
            return Err(Error::Config("cycle_period_s must be positive".into()));
        }
        let steer = &self.steering;
        if !(steer.pwm_min < steer.pwm_center && steer.pwm_center < steer.pwm_max) {
            return Err(Error::Config(format!(
                "steering calibration must satisfy pwm_min < pwm_center < pwm_max, got {}/{}/{}",
                steer.pwm_min, steer.pwm_center, steer.pwm_max
            )));
        }
        let sensors = &self.sensors;
        if sensors.sample_count == 0 {
            return Err(Error::Config("sample_count must be at least 1".into()));
        }
        if sensors.min_valid_cm >= sensors.max_valid_cm {
            return Err(Error::Config(format!(
                "min_valid_cm ({}) must be below max_valid_cm ({})",
                sensors.min_valid_cm, sensors.max_valid_cm
            )));
        }
        Ok(())
    }
}

impl Default for CarConfig {
    fn default() -> Self {
        Self {
            hardware: HardwareConfig {
                backend: "mock".to_string(),
                i2c_bus: 1,
                pca9685_addr: 0x40,
                front: SensorPins { trigger: 6, echo: 5 },
                left: SensorPins {
                    trigger: 26,
                    echo: 19,
                },
                right: SensorPins {
                    trigger: 11,
                    echo: 9,
                },
                mock_front_cm: 200.0,
                mock_left_cm: 200.0,
                mock_right_cm: 200.0,
            },
            nav: NavConfig {
                side_threshold_cm: 15.0,
                front_threshold_cm: 30.0,
                emergency_threshold_cm: 10.0,
                turn_angle_left: -40.0,
                turn_angle_right: 40.0,
                center_angle: 45.0,
                turn_duration_s: 3.0,
                reverse_duration_s: 1.0,
                reverse_pause_s: 0.5,
                forward_speed_pct: 100,
                reverse_speed_pct: -100,
                cycle_period_s: 0.1,
                avoid_retry_budget: 20,
                side_epsilon_cm: 1.0,
            },
            sensors: SensorConfig {
                sample_count: 5,
                sample_delay_s: 0.01,
                min_valid_cm: 2.0,
                max_valid_cm: 400.0,
                echo_timeout_s: 0.05,
            },
            steering: SteeringConfig {
                channel: 0,
                pwm_min: 200,
                pwm_center: 320,
                pwm_max: 500,
            },
            drive: DriveConfig {
                pwm_frequency_hz: 60,
                motor0: MotorPins {
                    enable_channel: 4,
                    pin_a: 17,
                    pin_b: 18,
                },
                motor1: MotorPins {
                    enable_channel: 5,
                    pin_a: 27,
                    pin_b: 22,
                },
            },
            launch: LaunchConfig {
                threshold: 5,
                integration_time_ms: 100,
                calibration_duration_s: 5.0,
                poll_interval_s: 1.0,
            },
            line: LineConfig {
                pin: 20,
                max_triggers: 2,
                grace_pause_s: 5.0,
                poll_interval_s: 0.2,
            },
            panel: PanelConfig {
                bind_address: "0.0.0.0:8080".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = CarConfig::default();
        config.validate().unwrap();
        assert_eq!(config.nav.side_threshold_cm, 15.0);
        assert_eq!(config.nav.front_threshold_cm, 30.0);
        assert_eq!(config.nav.emergency_threshold_cm, 10.0);
        assert_eq!(config.steering.pwm_center, 320);
        assert_eq!(config.sensors.sample_count, 5);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = CarConfig::default();
        let toml_string = toml::to_string_pretty(&config).unwrap();

        assert!(toml_string.contains("[hardware]"));
        assert!(toml_string.contains("[nav]"));
        assert!(toml_string.contains("[steering]"));
        assert!(toml_string.contains("side_threshold_cm = 15.0"));

        let parsed: CarConfig = toml::from_str(&toml_string).unwrap();
        assert_eq!(parsed.nav.turn_angle_left, -40.0);
        assert_eq!(parsed.drive.motor1.enable_channel, 5);
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let mut config = CarConfig::default();
        config.nav.emergency_threshold_cm = 40.0; // above front_threshold_cm
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_bad_servo_calibration_rejected() {
        let mut config = CarConfig::default();
        config.steering.pwm_center = 100; // below pwm_min
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_samples_rejected() {
        let mut config = CarConfig::default();
        config.sensors.sample_count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_positive_reverse_speed_rejected() {
        let mut config = CarConfig::default();
        config.nav.reverse_speed_pct = 50;
        assert!(config.validate().is_err());
    }
}
