//! Per-channel calibration

use crate::math::remap_clamp;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Rate-limit policy applied after each flush of velocity samples
///
/// In TOML: `throttle = { constant = 0.2 }` or `throttle = { random = 0.5 }`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Throttle {
    /// Fixed cooldown in seconds
    Constant(f32),
    /// Random cooldown up to the given seconds, shorter for stronger hits
    Random(f32),
}

impl Throttle {
    /// Cooldown after actuating at `intensity`, `None` when there is none
    pub fn delay(&self, intensity: f32) -> Option<Duration> {
        self.delay_with(intensity, rand::random::<f32>())
    }

    /// [`Throttle::delay`] with an explicit uniform sample in `[0, 1)`
    pub fn delay_with(&self, intensity: f32, sample: f32) -> Option<Duration> {
        let seconds = match *self {
            Throttle::Constant(w) => w,
            Throttle::Random(w) => sample * remap_clamp(intensity, 1.0, 0.0, 0.0, w),
        };
        Duration::try_from_secs_f32(seconds)
            .ok()
            .filter(|d| !d.is_zero())
    }
}

/// Calibration data for one physical actuator
#[derive(Debug, Clone, PartialEq)]
pub struct Actuator {
    /// Name, unique across the router
    pub name: String,
    /// Output at the sensitivity floor
    pub min: f32,
    /// Output at full intensity
    pub max: f32,
    /// Inputs below this produce 0
    pub min_sensitivity: f32,
    /// Divides raw velocity to normalize it into `[0, 1]`
    pub collider_scaler: f32,
    /// Optional rate limit
    pub throttle: Option<Throttle>,
}

impl Actuator {
    /// Actuator with identity calibration
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            min: 0.0,
            max: 1.0,
            min_sensitivity: 0.0,
            collider_scaler: 5.0,
            throttle: None,
        }
    }

    /// Set the output range
    pub fn with_range(mut self, min: f32, max: f32) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    /// Set the input floor
    pub fn with_min_sensitivity(mut self, min_sensitivity: f32) -> Self {
        self.min_sensitivity = min_sensitivity;
        self
    }

    /// Set the throttle policy
    pub fn with_throttle(mut self, throttle: Throttle) -> Self {
        self.throttle = Some(throttle);
        self
    }

    /// Map an intensity in `[0, 1]` to the device output range
    ///
    /// Below `min_sensitivity` the output is exactly 0; otherwise
    /// `[min_sensitivity, 1]` maps linearly onto `[min, max]`, clamped.
    /// Non-finite input maps to 0.
    pub fn map(&self, value: f32) -> f32 {
        if !value.is_finite() || value < self.min_sensitivity {
            return 0.0;
        }
        if self.min_sensitivity >= 1.0 {
            return self.max;
        }
        remap_clamp(value, self.min_sensitivity, 1.0, self.min, self.max)
    }
}
