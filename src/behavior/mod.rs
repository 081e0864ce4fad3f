//! Behavior engines: turn per-channel distance updates into actuation
//!
//! ```text
//!  distance update ──► Behavior::on_update ──► Controller::actuate
//!                            │
//!                            └─► Scheduler ──(timer event)──► Behavior::on_timer
//! ```
//!
//! Every channel carries an inactivity timeout: if no update re-arms it in
//! time, the channel is driven to zero. Engines are only ever called from the
//! event loop, one event at a time.

use crate::config::{parse_params, BehaviorConfig};
use crate::core::Controller;
use crate::error::{Error, Result};
use crate::protocol::Address;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

mod proximity;
mod scheduler;
mod velocity;

pub use proximity::{ProximityBased, ProximityParams};
pub use scheduler::{Scheduler, TimerEvent, TimerHandle, TimerKind};
pub use velocity::{VelocityBased, VelocityParams};

/// Inactivity timeout used when none is configured, seconds
pub const DEFAULT_TIMEOUT: f32 = 0.25;

/// Per-channel behavior engine
#[async_trait]
pub trait Behavior: Send {
    /// Called once before the first update
    async fn start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Cancel every pending timer
    async fn stop(&mut self) -> Result<()>;

    /// A new distance for one channel, `distance` in `[0, 1]`
    async fn on_update(
        &mut self,
        controller: &Arc<Controller>,
        address: Address,
        distance: f32,
    ) -> Result<()>;

    /// A timer armed by this engine fired
    async fn on_timer(&mut self, event: TimerEvent) -> Result<()>;
}

/// Identifies one actuator channel
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelKey {
    pub controller: String,
    pub address: Address,
}

impl ChannelKey {
    pub fn new(controller: &Controller, address: Address) -> Self {
        Self {
            controller: controller.name().to_string(),
            address,
        }
    }
}

/// State shared by every engine: the inactivity timeout
#[derive(Debug, Default)]
pub struct BehaviorState {
    timeout: Option<TimerHandle>,
}

impl BehaviorState {
    /// When the pending timeout fires, if one is armed
    pub fn timeout_at(&self) -> Option<Instant> {
        self.timeout.as_ref().map(TimerHandle::deadline)
    }

    /// Replace any pending timeout with a fresh one `delay` from now
    pub fn ensure_timeout(
        &mut self,
        scheduler: &mut Scheduler,
        delay: Duration,
        controller: &Arc<Controller>,
        address: Address,
    ) {
        if let Some(old) = self.timeout.take() {
            old.cancel();
        }
        self.timeout = Some(scheduler.schedule(delay, controller, address, TimerKind::Timeout));
    }

    /// Handle a fired timeout; stale events are ignored
    ///
    /// Returns true when the channel was driven to zero.
    pub async fn fire_timeout(&mut self, event: &TimerEvent) -> Result<bool> {
        match &self.timeout {
            Some(handle) if handle.matches(event) => {
                self.timeout = None;
                log::trace!(
                    "{}:{} timed out",
                    event.controller.name(),
                    event.address
                );
                event.controller.actuate(event.address, 0.0).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Drop the pending timeout without firing it
    pub fn cancel(&mut self) {
        if let Some(handle) = self.timeout.take() {
            handle.cancel();
        }
    }
}

/// Convert configured seconds to a duration
pub(crate) fn seconds(name: &str, value: f32) -> Result<Duration> {
    Duration::try_from_secs_f32(value)
        .map_err(|_| Error::Config(format!("{} must be a non-negative number of seconds, got {}", name, value)))
}

/// Create a behavior engine based on configuration
pub fn create_behavior(config: &BehaviorConfig, scheduler: Scheduler) -> Result<Box<dyn Behavior>> {
    match config.kind.to_ascii_lowercase().as_str() {
        "proximity" => {
            let params: ProximityParams = parse_params("behavior", &config.kind, &config.params)?;
            Ok(Box::new(ProximityBased::new(params, scheduler)?))
        }
        "velocity" => {
            let params: VelocityParams = parse_params("behavior", &config.kind, &config.params)?;
            Ok(Box::new(VelocityBased::new(params, scheduler)?))
        }
        _ => Err(Error::UnknownType {
            kind: "behavior",
            name: config.kind.clone(),
        }),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::connection::MockConnection;
    use crate::core::{Actuator, Throttle};
    use crate::protocol::DakyProtocol;
    use std::collections::BTreeMap;

    /// Connected controller with actuators 0 (plain) and 1 (constant 0.2s throttle)
    pub async fn controller(mock: &MockConnection) -> Arc<Controller> {
        let mut actuators = BTreeMap::new();
        actuators.insert(0, Actuator::new("plain"));
        actuators.insert(
            1,
            Actuator::new("throttled").with_throttle(Throttle::Constant(0.2)),
        );
        let controller = Arc::new(Controller::new(
            "test",
            actuators,
            Box::new(DakyProtocol),
            Box::new(mock.clone()),
        ));
        controller.connect().await.unwrap();
        controller
    }

    /// Intensity byte of every actuation sent so far
    pub fn levels(mock: &MockConnection) -> Vec<u8> {
        mock.sent().iter().map(|frame| frame[2]).collect()
    }
}
