//! Proximity engine: the closer the contact, the stronger the vibration

use super::{
    seconds, Behavior, BehaviorState, ChannelKey, Scheduler, TimerEvent, TimerKind,
    DEFAULT_TIMEOUT,
};
use crate::core::Controller;
use crate::error::Result;
use crate::protocol::Address;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Proximity engine parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProximityParams {
    /// Inactivity timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: f32,
}

fn default_timeout() -> f32 {
    DEFAULT_TIMEOUT
}

impl Default for ProximityParams {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Actuates each channel at `1 - distance`
pub struct ProximityBased {
    timeout: Duration,
    scheduler: Scheduler,
    states: HashMap<ChannelKey, BehaviorState>,
}

impl ProximityBased {
    pub fn new(params: ProximityParams, scheduler: Scheduler) -> Result<Self> {
        Ok(Self {
            timeout: seconds("timeout", params.timeout)?,
            scheduler,
            states: HashMap::new(),
        })
    }

    /// Channel state, if the channel has seen an update
    pub fn state(&self, key: &ChannelKey) -> Option<&BehaviorState> {
        self.states.get(key)
    }
}

#[async_trait]
impl Behavior for ProximityBased {
    async fn stop(&mut self) -> Result<()> {
        self.states.values_mut().for_each(BehaviorState::cancel);
        Ok(())
    }

    async fn on_update(
        &mut self,
        controller: &Arc<Controller>,
        address: Address,
        distance: f32,
    ) -> Result<()> {
        controller.actuate(address, 1.0 - distance).await?;
        let state = self
            .states
            .entry(ChannelKey::new(controller, address))
            .or_default();
        state.ensure_timeout(&mut self.scheduler, self.timeout, controller, address);
        Ok(())
    }

    async fn on_timer(&mut self, event: TimerEvent) -> Result<()> {
        if event.kind != TimerKind::Timeout {
            return Ok(());
        }
        let key = ChannelKey::new(&event.controller, event.address);
        if let Some(state) = self.states.get_mut(&key) {
            state.fire_timeout(&event).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{controller, levels};
    use super::*;
    use crate::connection::MockConnection;
    use tokio::time::{advance, Instant};

    fn engine() -> (ProximityBased, tokio::sync::mpsc::UnboundedReceiver<TimerEvent>) {
        let (scheduler, rx) = Scheduler::channel();
        (
            ProximityBased::new(ProximityParams::default(), scheduler).unwrap(),
            rx,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_update_then_timeout() {
        let mock = MockConnection::new();
        let c = controller(&mock).await;
        let (mut engine, mut timers) = engine();
        let start = Instant::now();

        engine.on_update(&c, 0, 0.25).await.unwrap();
        // 0.75 * 255 = 191.25
        assert_eq!(levels(&mock), vec![191]);

        let event = timers.recv().await.unwrap();
        assert!(Instant::now() - start >= Duration::from_millis(250));
        engine.on_timer(event).await.unwrap();
        assert_eq!(levels(&mock), vec![191, 0]);
        assert!(engine
            .state(&ChannelKey::new(&c, 0))
            .unwrap()
            .timeout_at()
            .is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_updates_rearm_timeout() {
        let mock = MockConnection::new();
        let c = controller(&mock).await;
        let (mut engine, mut timers) = engine();

        engine.on_update(&c, 0, 1.0).await.unwrap();
        advance(Duration::from_millis(200)).await;
        engine.on_update(&c, 0, 0.0).await.unwrap();
        advance(Duration::from_millis(200)).await;
        engine.on_update(&c, 0, 0.5).await.unwrap();

        // Only the latest timeout may act
        let event = timers.recv().await.unwrap();
        engine.on_timer(event).await.unwrap();
        assert_eq!(levels(&mock), vec![0, 255, 128, 0]);
        assert!(timers.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_timeout_ignored() {
        let mock = MockConnection::new();
        let c = controller(&mock).await;
        let (mut engine, _timers) = engine();

        engine.on_update(&c, 0, 0.0).await.unwrap();
        let stale = TimerEvent {
            controller: Arc::clone(&c),
            address: 0,
            kind: TimerKind::Timeout,
            id: u64::MAX,
        };
        engine.on_timer(stale).await.unwrap();
        assert_eq!(levels(&mock), vec![255]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_channels_are_independent() {
        let mock = MockConnection::new();
        let c = controller(&mock).await;
        let (mut engine, mut timers) = engine();

        engine.on_update(&c, 0, 0.0).await.unwrap();
        advance(Duration::from_millis(100)).await;
        engine.on_update(&c, 1, 0.0).await.unwrap();

        let first = timers.recv().await.unwrap();
        assert_eq!(first.address, 0);
        engine.on_timer(first).await.unwrap();
        let second = timers.recv().await.unwrap();
        assert_eq!(second.address, 1);
        engine.on_timer(second).await.unwrap();

        assert_eq!(mock.sent()[2], vec![0x42, 0, 0]);
        assert_eq!(mock.sent()[3], vec![0x42, 1, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_timeouts() {
        let mock = MockConnection::new();
        let c = controller(&mock).await;
        let (mut engine, mut timers) = engine();

        engine.on_update(&c, 0, 0.2).await.unwrap();
        engine.stop().await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(timers.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_address_leaves_no_state() {
        let mock = MockConnection::new();
        let c = controller(&mock).await;
        let (mut engine, _timers) = engine();
        assert!(matches!(
            engine.on_update(&c, 9, 0.5).await,
            Err(crate::error::Error::ChannelNotFound { address: 9, .. })
        ));
        assert!(engine.state(&ChannelKey::new(&c, 9)).is_none());
        assert!(mock.sent().is_empty());
    }
}
