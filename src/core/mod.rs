//! Routing core: actuator calibration, controllers and the name router

mod actuator;
mod controller;
mod router;

pub use actuator::{Actuator, Throttle};
pub use controller::Controller;
pub use router::Router;
