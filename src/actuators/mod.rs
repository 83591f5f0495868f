//! Actuator drivers: drive motors and steering servo

pub mod drive;
pub mod steering;

pub use drive::{DriveMotors, MotorChannel};
pub use steering::{AngleDomain, SteeringServo};
