//! Reactive navigation
//!
//! The car cruises forward and reacts to threshold crossings on the three
//! rangefinders. [`classify`] is the pure decision ladder; the maneuvers
//! it selects live in [`control_loop`], the thread lifecycle around them
//! in [`controller`].

pub mod choreo;
pub mod control_loop;
pub mod controller;
pub mod speed;

use crate::config::NavConfig;
use serde::Serialize;

/// What the car is doing, derived from the latest sensor readings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleState {
    /// Path clear, driving forward
    Cruising,
    /// Obstacle on the left side only
    AvoidLeft,
    /// Obstacle on the right side only
    AvoidRight,
    /// Obstacles on both sides
    AvoidBoth,
    /// Obstacle ahead, inside the front threshold
    AvoidFront,
    /// Obstacle ahead, inside the emergency threshold (or front sensor
    /// unreadable)
    Emergency,
}

/// Last known clearances in centimeters
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Distances {
    pub front: f64,
    pub left: f64,
    pub right: f64,
}

/// Decision ladder over one set of readings.
///
/// Emergency outranks everything, then the front threshold, then the
/// sides. Side sensors fail open (an unreadable side counts as clear);
/// the front sensor fails closed (unreadable counts as Emergency), since
/// driving blind forward is the one thing the car must never do.
pub fn classify(
    front: Option<f64>,
    left: Option<f64>,
    right: Option<f64>,
    nav: &NavConfig,
) -> VehicleState {
    let front = match front {
        Some(cm) => cm,
        None => return VehicleState::Emergency,
    };
    if front < nav.emergency_threshold_cm {
        return VehicleState::Emergency;
    }
    if front < nav.front_threshold_cm {
        return VehicleState::AvoidFront;
    }
    let left_blocked = left.map_or(false, |cm| cm < nav.side_threshold_cm);
    let right_blocked = right.map_or(false, |cm| cm < nav.side_threshold_cm);
    match (left_blocked, right_blocked) {
        (true, true) => VehicleState::AvoidBoth,
        (true, false) => VehicleState::AvoidLeft,
        (false, true) => VehicleState::AvoidRight,
        (false, false) => VehicleState::Cruising,
    }
}
