//! Haptic bridge - drives haptic actuators from game proximity telemetry
//!
//! Telemetry values arrive per named path, are routed to a physical actuator
//! on a controller, shaped by a behavior engine and sent to the device over
//! UDP or a length-framed USB serial link.

pub mod behavior;
pub mod config;
pub mod connection;
pub mod core;
pub mod error;
pub mod manager;
pub mod math;
pub mod protocol;
pub mod telemetry;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
pub use manager::Manager;
