//! HC-SR04 ultrasonic rangefinders
//!
//! A measurement triggers the sensor with a >=10 us pulse, times the echo
//! pulse with bounded waits on both edges, and converts the round-trip
//! time to centimeters. [`UltrasonicSensor`] filters several raw samples
//! into one reading and rejects anything outside the valid window, so a
//! stray echo fails the measurement instead of steering the car.

use crate::config::SensorConfig;
use crate::error::{Error, Result};
use crate::hw::{DigitalInput, DigitalOutput};
use crate::sensors::DistanceSensor;
use std::time::{Duration, Instant};

/// Half the speed of sound, in cm per second of round-trip time
pub const PULSE_TO_CM: f64 = 17150.0;

/// Source of one raw echo round-trip time, in seconds
pub trait RangeFinder: Send {
    fn measure_pulse(&mut self) -> Result<f64>;
}

/// Rangefinder over a trigger output and an echo input
pub struct GpioRangeFinder {
    name: &'static str,
    trigger: Box<dyn DigitalOutput>,
    echo: Box<dyn DigitalInput>,
    timeout: Duration,
}

impl GpioRangeFinder {
    pub fn new(
        name: &'static str,
        trigger: Box<dyn DigitalOutput>,
        echo: Box<dyn DigitalInput>,
        echo_timeout: Duration,
    ) -> Self {
        Self {
            name,
            trigger,
            echo,
            timeout: echo_timeout,
        }
    }

    /// Spin until the echo line reaches `level`, bounded by the timeout
    fn wait_for_edge(&self, level: bool, edge: &'static str) -> Result<Instant> {
        let deadline = Instant::now() + self.timeout;
        loop {
            let now = Instant::now();
            if self.echo.is_high() == level {
                return Ok(now);
            }
            if now >= deadline {
                return Err(Error::SensorTimeout {
                    sensor: self.name,
                    edge,
                });
            }
            std::hint::spin_loop();
        }
    }
}

impl RangeFinder for GpioRangeFinder {
    fn measure_pulse(&mut self) -> Result<f64> {
        self.trigger.set_high();
        // Datasheet minimum trigger width is 10 us
        std::thread::sleep(Duration::from_micros(10));
        self.trigger.set_low();

        let rise = self.wait_for_edge(true, "rise")?;
        let fall = self.wait_for_edge(false, "fall")?;
        Ok((fall - rise).as_secs_f64())
    }
}

/// Multi-sample averaging filter over a raw rangefinder
pub struct UltrasonicSensor {
    name: &'static str,
    finder: Box<dyn RangeFinder>,
    sample_count: u32,
    sample_delay: Duration,
    min_valid_cm: f64,
    max_valid_cm: f64,
    last: Option<f64>,
}

impl UltrasonicSensor {
    pub fn new(name: &'static str, finder: Box<dyn RangeFinder>, config: &SensorConfig) -> Self {
        Self {
            name,
            finder,
            sample_count: config.sample_count.max(1),
            sample_delay: Duration::from_secs_f64(config.sample_delay_s),
            min_valid_cm: config.min_valid_cm,
            max_valid_cm: config.max_valid_cm,
            last: None,
        }
    }
}

impl DistanceSensor for UltrasonicSensor {
    fn name(&self) -> &'static str {
        self.name
    }

    /// Average of `sample_count` raw samples. Any timed-out or
    /// out-of-range sample fails the whole measurement; the last good
    /// value stays cached.
    fn measure(&mut self) -> Result<f64> {
        let mut sum = 0.0;
        for i in 0..self.sample_count {
            let pulse_s = self.finder.measure_pulse()?;
            let cm = pulse_s * PULSE_TO_CM;
            if cm <= self.min_valid_cm || cm > self.max_valid_cm {
                return Err(Error::SensorOutOfRange {
                    sensor: self.name,
                    distance_cm: cm,
                });
            }
            sum += cm;
            if i + 1 < self.sample_count {
                std::thread::sleep(self.sample_delay);
            }
        }
        let mean = sum / self.sample_count as f64;
        self.last = Some(mean);
        Ok(mean)
    }

    fn last_distance(&self) -> Option<f64> {
        self.last
    }
}
