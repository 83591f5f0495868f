//! Color launch trigger
//!
//! A TCS34725-class color sensor is calibrated against the ambient scene
//! at startup; afterwards a reading that deviates from the reference by
//! more than the configured threshold on any channel counts as a color
//! event. A green event launches the car, once.

use crate::config::LaunchConfig;
use crate::error::Result;
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// An RGB color sensor returning one byte per channel
pub trait RgbSensor: Send {
    fn read_rgb(&mut self) -> Result<(u8, u8, u8)>;
}

/// Dominant primary color of a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Red,
    Green,
    Blue,
}

/// Strictly dominant channel, if any
pub fn dominant_color(r: u8, g: u8, b: u8) -> Option<Color> {
    if g > r && g > b {
        Some(Color::Green)
    } else if r > g && r > b {
        Some(Color::Red)
    } else if b > r && b > g {
        Some(Color::Blue)
    } else {
        None
    }
}

/// Watches the color sensor and fires the launch callback on green
pub struct ColorLaunchMonitor {
    sensor: Box<dyn RgbSensor>,
    threshold: u8,
    calibration_duration: Duration,
    poll_interval: Duration,
    reference: Option<(f64, f64, f64)>,
}

impl ColorLaunchMonitor {
    pub fn new(sensor: Box<dyn RgbSensor>, config: &LaunchConfig) -> Self {
        Self {
            sensor,
            threshold: config.threshold,
            calibration_duration: Duration::from_secs_f64(config.calibration_duration_s),
            poll_interval: Duration::from_secs_f64(config.poll_interval_s),
            reference: None,
        }
    }

    /// Average readings over the calibration window to establish the
    /// ambient reference. Nothing may be held in front of the sensor
    /// during this.
    pub fn calibrate(&mut self) -> Result<()> {
        let deadline = Instant::now() + self.calibration_duration;
        let (mut sum_r, mut sum_g, mut sum_b) = (0.0f64, 0.0f64, 0.0f64);
        let mut samples = 0u32;
        loop {
            let (r, g, b) = self.sensor.read_rgb()?;
            sum_r += r as f64;
            sum_g += g as f64;
            sum_b += b as f64;
            samples += 1;
            if Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(Duration::from_millis(100));
        }
        let n = samples as f64;
        let reference = (sum_r / n, sum_g / n, sum_b / n);
        info!(
            "Color reference calibrated over {} samples: ({:.0}, {:.0}, {:.0})",
            samples, reference.0, reference.1, reference.2
        );
        self.reference = Some(reference);
        Ok(())
    }

    /// Classify a reading against the calibrated reference. No event while
    /// every channel stays within the threshold, and none at all before
    /// calibration.
    fn classify(&self, r: u8, g: u8, b: u8) -> Option<Color> {
        let (ref_r, ref_g, ref_b) = self.reference?;
        let deviates = (r as f64 - ref_r).abs() > self.threshold as f64
            || (g as f64 - ref_g).abs() > self.threshold as f64
            || (b as f64 - ref_b).abs() > self.threshold as f64;
        if deviates {
            dominant_color(r, g, b)
        } else {
            None
        }
    }

    /// Poll until a green event fires the launch callback or the daemon
    /// stops. The trigger fires at most once.
    pub fn run(&mut self, running: &AtomicBool, launch: impl FnOnce()) {
        while running.load(Ordering::SeqCst) {
            match self.sensor.read_rgb() {
                Ok((r, g, b)) => {
                    if self.classify(r, g, b) == Some(Color::Green) {
                        info!("Green detected ({}, {}, {}), launching", r, g, b);
                        launch();
                        return;
                    }
                }
                Err(e) => warn!("Color sensor read failed: {}", e),
            }
            std::thread::sleep(self.poll_interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::mock::MockRgbSensor;
    use std::sync::atomic::AtomicBool;

    fn test_config() -> LaunchConfig {
        LaunchConfig {
            threshold: 5,
            integration_time_ms: 100,
            calibration_duration_s: 0.0,
            poll_interval_s: 0.0,
        }
    }

    #[test]
    fn test_dominant_color() {
        assert_eq!(dominant_color(200, 10, 10), Some(Color::Red));
        assert_eq!(dominant_color(10, 200, 10), Some(Color::Green));
        assert_eq!(dominant_color(10, 10, 200), Some(Color::Blue));
        // Ties have no dominant channel
        assert_eq!(dominant_color(100, 100, 10), None);
        assert_eq!(dominant_color(100, 100, 100), None);
    }

    #[test]
    fn test_no_event_within_threshold() {
        let sensor = MockRgbSensor::new(100, 100, 100);
        let mut monitor = ColorLaunchMonitor::new(Box::new(sensor), &test_config());
        monitor.calibrate().unwrap();
        // Small drift around the reference stays quiet
        assert_eq!(monitor.classify(103, 98, 100), None);
    }

    #[test]
    fn test_green_event_beyond_threshold() {
        let sensor = MockRgbSensor::new(100, 100, 100);
        let mut monitor = ColorLaunchMonitor::new(Box::new(sensor), &test_config());
        monitor.calibrate().unwrap();
        assert_eq!(monitor.classify(40, 180, 30), Some(Color::Green));
        assert_eq!(monitor.classify(180, 40, 30), Some(Color::Red));
    }

    #[test]
    fn test_no_event_before_calibration() {
        let sensor = MockRgbSensor::new(100, 100, 100);
        let monitor = ColorLaunchMonitor::new(Box::new(sensor), &test_config());
        assert_eq!(monitor.classify(0, 255, 0), None);
    }

    #[test]
    fn test_run_fires_launch_on_green() {
        let sensor = MockRgbSensor::new(100, 100, 100);
        let handle = sensor.handle();
        let mut monitor = ColorLaunchMonitor::new(Box::new(sensor), &test_config());
        monitor.calibrate().unwrap();
        handle.set_color(30, 200, 30);

        let running = AtomicBool::new(true);
        let mut launched = false;
        monitor.run(&running, || launched = true);
        assert!(launched);
    }
}
