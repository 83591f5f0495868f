//! Ratha - control library for an autonomous obstacle-avoiding car
//!
//! The car drives forward and avoids obstacles using three ultrasonic
//! rangefinders (front/left/right), steering via a position-controlled
//! servo and driving two motor channels through an H-bridge. The core is
//! the reactive avoidance controller in [`nav`]; hardware access goes
//! through the trait seam in [`hw`] so everything runs against the mock
//! backend without a robot attached.
//!
//! ## Features
//!
//! - `mock` (default): simulation backend for hardware-free testing
//! - `rpi`: Raspberry Pi backend (GPIO + PCA9685 + TCS34725)

pub mod actuators;
pub mod config;
pub mod error;
pub mod hw;
pub mod nav;
pub mod panel;
pub mod sensors;

// Re-export commonly used types
pub use config::CarConfig;
pub use error::{Error, Result};
pub use nav::controller::NavController;
