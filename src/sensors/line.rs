//! Line-crossing shutdown trigger
//!
//! A reflectance sensor under the chassis reads high over a light surface
//! and low over a dark line. Each light-to-dark transition counts as one
//! crossing; staying on the line does not re-count. The first crossing
//! earns a grace pause, reaching the configured limit shuts the car down.

use crate::config::LineConfig;
use crate::hw::DigitalInput;
use log::warn;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// A newly detected crossing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEvent {
    /// Crossing below the limit
    Crossed { count: u32 },
    /// This crossing reached the limit
    Limit { count: u32 },
}

/// Edge-triggered crossing counter
pub struct LineDetector {
    over_line: bool,
    count: u32,
    max_triggers: u32,
}

impl LineDetector {
    pub fn new(max_triggers: u32) -> Self {
        Self {
            over_line: false,
            count: 0,
            max_triggers: max_triggers.max(1),
        }
    }

    /// Feed one sample; returns an event only on a light-to-dark edge
    pub fn poll(&mut self, dark: bool) -> Option<LineEvent> {
        if dark {
            if self.over_line {
                return None;
            }
            self.over_line = true;
            self.count += 1;
            if self.count >= self.max_triggers {
                Some(LineEvent::Limit { count: self.count })
            } else {
                Some(LineEvent::Crossed { count: self.count })
            }
        } else {
            self.over_line = false;
            None
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

/// Polls the line input and fires the shutdown callback at the limit
pub struct LineMonitor {
    input: Box<dyn DigitalInput>,
    detector: LineDetector,
    grace_pause: Duration,
    poll_interval: Duration,
}

impl LineMonitor {
    pub fn new(input: Box<dyn DigitalInput>, config: &LineConfig) -> Self {
        Self {
            input,
            detector: LineDetector::new(config.max_triggers),
            grace_pause: Duration::from_secs_f64(config.grace_pause_s),
            poll_interval: Duration::from_secs_f64(config.poll_interval_s),
        }
    }

    /// Poll until the crossing limit fires the shutdown callback or the
    /// daemon stops
    pub fn run(&mut self, running: &AtomicBool, shutdown: impl FnOnce()) {
        while running.load(Ordering::SeqCst) {
            let dark = !self.input.is_high();
            match self.detector.poll(dark) {
                Some(LineEvent::Crossed { count }) => {
                    warn!("Line crossed ({} of {})", count, self.detector.max_triggers);
                    if count == 1 {
                        std::thread::sleep(self.grace_pause);
                    }
                }
                Some(LineEvent::Limit { count }) => {
                    warn!("Line crossed {} times, shutting down", count);
                    shutdown();
                    return;
                }
                None => {}
            }
            std::thread::sleep(self.poll_interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::mock::MockLevelInput;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn test_continuous_dark_counts_once() {
        let mut detector = LineDetector::new(3);
        assert_eq!(detector.poll(true), Some(LineEvent::Crossed { count: 1 }));
        assert_eq!(detector.poll(true), None);
        assert_eq!(detector.poll(true), None);
        assert_eq!(detector.count(), 1);
    }

    #[test]
    fn test_second_crossing_reaches_limit() {
        let mut detector = LineDetector::new(2);
        assert_eq!(detector.poll(true), Some(LineEvent::Crossed { count: 1 }));
        assert_eq!(detector.poll(false), None);
        assert_eq!(detector.poll(true), Some(LineEvent::Limit { count: 2 }));
    }

    #[test]
    fn test_limit_of_one_fires_immediately() {
        let mut detector = LineDetector::new(1);
        assert_eq!(detector.poll(true), Some(LineEvent::Limit { count: 1 }));
    }

    #[test]
    fn test_light_surface_never_fires() {
        let mut detector = LineDetector::new(2);
        for _ in 0..10 {
            assert_eq!(detector.poll(false), None);
        }
        assert_eq!(detector.count(), 0);
    }

    #[test]
    fn test_monitor_fires_shutdown_at_limit() {
        // Sensor already over the line: with a limit of 1 the first poll
        // shuts down
        let input = MockLevelInput::new(false);
        let config = LineConfig {
            pin: 20,
            max_triggers: 1,
            grace_pause_s: 0.0,
            poll_interval_s: 0.0,
        };
        let mut monitor = LineMonitor::new(Box::new(input), &config);
        let running = AtomicBool::new(true);
        let mut fired = false;
        monitor.run(&running, || fired = true);
        assert!(fired);
    }
}
