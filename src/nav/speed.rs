//! Estimated-speed model
//!
//! The chassis has no wheel encoders, so the reported speed is a simple
//! bounded ramp: each cruising cycle accelerates by a fixed step up to the
//! plateau, any stop resets to zero. Reporting only, never fed back into
//! motor commands.

/// Ramp plateau (m/s equivalent, matches the chassis top speed)
pub const DEFAULT_MAX_SPEED: f64 = 2.0;
/// Per-cycle acceleration step
pub const DEFAULT_ACCELERATION: f64 = 0.1;

/// Bounded speed ramp
pub struct SpeedModel {
    current: f64,
    max_speed: f64,
    acceleration: f64,
}

impl SpeedModel {
    pub fn new(max_speed: f64, acceleration: f64) -> Self {
        Self {
            current: 0.0,
            max_speed,
            acceleration,
        }
    }

    /// One cruising cycle of acceleration; saturates at the plateau
    pub fn ramp_up(&mut self) -> f64 {
        self.current = (self.current + self.acceleration).min(self.max_speed);
        self.current
    }

    /// The car stopped
    pub fn reset(&mut self) {
        self.current = 0.0;
    }

    pub fn current(&self) -> f64 {
        self.current
    }
}

impl Default for SpeedModel {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SPEED, DEFAULT_ACCELERATION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ramp_saturates_at_plateau() {
        let mut model = SpeedModel::new(2.0, 0.1);
        for _ in 0..100 {
            model.ramp_up();
        }
        assert_eq!(model.current(), 2.0);
    }

    #[test]
    fn test_ramp_is_stepwise() {
        let mut model = SpeedModel::new(2.0, 0.1);
        assert!((model.ramp_up() - 0.1).abs() < 1e-9);
        assert!((model.ramp_up() - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_reset_zeroes_speed() {
        let mut model = SpeedModel::default();
        model.ramp_up();
        model.reset();
        assert_eq!(model.current(), 0.0);
    }
}
