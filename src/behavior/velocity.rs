//! Velocity engine: vibrate in proportion to how fast contact moves
//!
//! Each update turns the change in distance into a normalized speed sample.
//! Samples are averaged and flushed to the actuator; an actuator with a
//! throttle then holds further samples until its window ends.
//!
//! ```text
//!   t:     0     50    100   150   200   250 ms      (throttle = 200 ms)
//!   d:     0.0   0.1   0.15  0.25  0.3
//!   v:     -     0.4   0.2   0.4   0.2
//!   out:         0.4 ─────── held ───────► 0.27
//! ```

use super::{
    seconds, Behavior, BehaviorState, ChannelKey, Scheduler, TimerEvent, TimerHandle, TimerKind,
    DEFAULT_TIMEOUT,
};
use crate::core::Controller;
use crate::error::{Error, Result};
use crate::math::clamp;
use crate::protocol::Address;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Gap after which samples are considered unrelated, seconds
pub const DEFAULT_STALL_TIME: f32 = 0.5;

/// Velocity engine parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VelocityParams {
    /// Inactivity timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: f32,
    /// Maximum gap between updates that still yields a speed sample
    #[serde(default = "default_stall_time")]
    pub stall_time: f32,
}

fn default_timeout() -> f32 {
    DEFAULT_TIMEOUT
}
fn default_stall_time() -> f32 {
    DEFAULT_STALL_TIME
}

impl Default for VelocityParams {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            stall_time: DEFAULT_STALL_TIME,
        }
    }
}

/// Per-channel velocity state
#[derive(Debug, Default)]
pub struct VelocityState {
    base: BehaviorState,
    last_distance: f32,
    last_time: Option<Instant>,
    samples: Vec<f32>,
    throttle: Option<TimerHandle>,
}

impl VelocityState {
    /// Inactivity timeout state
    pub fn base(&self) -> &BehaviorState {
        &self.base
    }

    /// When the current throttle window ends, if one is open
    pub fn next_at(&self) -> Option<Instant> {
        self.throttle.as_ref().map(TimerHandle::deadline)
    }

    /// Samples waiting for the next flush
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }
}

/// Velocity-based engine
pub struct VelocityBased {
    timeout: Duration,
    stall_time: Duration,
    scheduler: Scheduler,
    states: HashMap<ChannelKey, VelocityState>,
}

impl VelocityBased {
    pub fn new(params: VelocityParams, scheduler: Scheduler) -> Result<Self> {
        Ok(Self {
            timeout: seconds("timeout", params.timeout)?,
            stall_time: seconds("stall_time", params.stall_time)?,
            scheduler,
            states: HashMap::new(),
        })
    }

    /// Channel state, if the channel has seen an update
    pub fn state(&self, key: &ChannelKey) -> Option<&VelocityState> {
        self.states.get(key)
    }

    /// Actuate the average of pending samples, then open a throttle window
    async fn flush(
        scheduler: &mut Scheduler,
        timeout: Duration,
        state: &mut VelocityState,
        controller: &Arc<Controller>,
        address: Address,
    ) -> Result<()> {
        if state.samples.is_empty() {
            return Ok(());
        }
        let samples = std::mem::take(&mut state.samples);
        let average = samples.iter().sum::<f32>() / samples.len() as f32;

        controller.actuate(address, average).await?;
        log::trace!(
            "{}:{} flushed {} sample(s), avg {:.3}",
            controller.name(),
            address,
            samples.len(),
            average
        );
        state
            .base
            .ensure_timeout(scheduler, timeout, controller, address);

        let delay = controller
            .resolve(address)
            .and_then(|actuator| actuator.throttle)
            .and_then(|throttle| throttle.delay(average));
        if let Some(delay) = delay {
            if state.throttle.is_some() {
                log::error!(
                    "{}:{} throttle already pending, not rescheduling",
                    controller.name(),
                    address
                );
            } else {
                state.throttle =
                    Some(scheduler.schedule(delay, controller, address, TimerKind::Throttle));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Behavior for VelocityBased {
    async fn stop(&mut self) -> Result<()> {
        for state in self.states.values_mut() {
            state.base.cancel();
            state.throttle = None;
        }
        Ok(())
    }

    async fn on_update(
        &mut self,
        controller: &Arc<Controller>,
        address: Address,
        distance: f32,
    ) -> Result<()> {
        let collider_scaler = controller
            .resolve(address)
            .map(|actuator| actuator.collider_scaler)
            .ok_or_else(|| Error::ChannelNotFound {
                controller: controller.name().to_string(),
                address,
            })?;
        if !distance.is_finite() {
            log::debug!("{}:{} ignoring distance {}", controller.name(), address, distance);
            return Ok(());
        }

        let now = Instant::now();
        let state = self
            .states
            .entry(ChannelKey::new(controller, address))
            .or_default();

        match state.last_time {
            Some(last) if now - last <= self.stall_time => {
                let dt = (now - last).as_secs_f32();
                if dt > 0.0 {
                    let speed = (state.last_distance - distance).abs() / dt / collider_scaler;
                    state.samples.push(clamp(speed, 0.0, 1.0));
                }
            }
            _ => {
                if !state.samples.is_empty() {
                    log::trace!(
                        "{}:{} stalled, dropping {} sample(s)",
                        controller.name(),
                        address,
                        state.samples.len()
                    );
                }
                state.samples.clear();
            }
        }
        state.last_time = Some(now);
        state.last_distance = distance;

        if state.throttle.is_some() {
            return Ok(());
        }
        Self::flush(&mut self.scheduler, self.timeout, state, controller, address).await
    }

    async fn on_timer(&mut self, event: TimerEvent) -> Result<()> {
        let key = ChannelKey::new(&event.controller, event.address);
        let Some(state) = self.states.get_mut(&key) else {
            return Ok(());
        };

        match event.kind {
            TimerKind::Timeout => {
                state.base.fire_timeout(&event).await?;
            }
            TimerKind::Throttle => {
                let current = state
                    .throttle
                    .as_ref()
                    .is_some_and(|handle| handle.matches(&event));
                if current {
                    state.throttle = None;
                    Self::flush(
                        &mut self.scheduler,
                        self.timeout,
                        state,
                        &event.controller,
                        event.address,
                    )
                    .await?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{controller, levels};
    use super::*;
    use crate::connection::MockConnection;
    use crate::core::{Actuator, Throttle};
    use crate::protocol::DakyProtocol;
    use std::collections::BTreeMap;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::advance;

    /// Controller with a random-throttled actuator at 0 and a slow one at 1
    async fn windowed(mock: &MockConnection) -> Arc<Controller> {
        let mut actuators = BTreeMap::new();
        actuators.insert(0, Actuator::new("jittery").with_throttle(Throttle::Random(0.5)));
        actuators.insert(1, Actuator::new("slow").with_throttle(Throttle::Constant(2.0)));
        let controller = Arc::new(Controller::new(
            "windowed",
            actuators,
            Box::new(DakyProtocol),
            Box::new(mock.clone()),
        ));
        controller.connect().await.unwrap();
        controller
    }

    /// Engine whose inactivity timeout outlasts every throttle window
    fn patient_engine() -> (VelocityBased, UnboundedReceiver<TimerEvent>) {
        let (scheduler, rx) = Scheduler::channel();
        let params = VelocityParams {
            timeout: 5.0,
            stall_time: DEFAULT_STALL_TIME,
        };
        (VelocityBased::new(params, scheduler).unwrap(), rx)
    }

    fn engine() -> (VelocityBased, UnboundedReceiver<TimerEvent>) {
        let (scheduler, rx) = Scheduler::channel();
        (
            VelocityBased::new(VelocityParams::default(), scheduler).unwrap(),
            rx,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_update_only_primes() {
        let mock = MockConnection::new();
        let c = controller(&mock).await;
        let (mut engine, _timers) = engine();

        engine.on_update(&c, 0, 0.4).await.unwrap();
        assert!(mock.sent().is_empty());
        let state = engine.state(&ChannelKey::new(&c, 0)).unwrap();
        assert!(state.samples().is_empty());
        assert!(state.base().timeout_at().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_speed_sample_and_timeout() {
        let mock = MockConnection::new();
        let c = controller(&mock).await;
        let (mut engine, mut timers) = engine();

        engine.on_update(&c, 0, 0.0).await.unwrap();
        advance(Duration::from_millis(100)).await;
        // 0.1 / 0.1s / 5 = 0.2
        engine.on_update(&c, 0, 0.1).await.unwrap();
        assert_eq!(levels(&mock), vec![51]);

        let event = timers.recv().await.unwrap();
        assert_eq!(event.kind, TimerKind::Timeout);
        engine.on_timer(event).await.unwrap();
        assert_eq!(levels(&mock), vec![51, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_speed_is_clamped() {
        let mock = MockConnection::new();
        let c = controller(&mock).await;
        let (mut engine, _timers) = engine();

        engine.on_update(&c, 0, 1.0).await.unwrap();
        advance(Duration::from_millis(10)).await;
        engine.on_update(&c, 0, 0.0).await.unwrap();
        assert_eq!(levels(&mock), vec![255]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stall_discards_history() {
        let mock = MockConnection::new();
        let c = controller(&mock).await;
        let (mut engine, _timers) = engine();

        engine.on_update(&c, 0, 0.0).await.unwrap();
        advance(Duration::from_millis(600)).await;
        engine.on_update(&c, 0, 0.5).await.unwrap();
        assert!(mock.sent().is_empty());

        advance(Duration::from_millis(100)).await;
        engine.on_update(&c, 0, 0.6).await.unwrap();
        assert_eq!(levels(&mock), vec![51]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_constant_throttle_averages_held_samples() {
        let mock = MockConnection::new();
        let c = controller(&mock).await;
        let (mut engine, mut timers) = engine();
        let key = ChannelKey::new(&c, 1);

        engine.on_update(&c, 1, 0.0).await.unwrap();
        for distance in [0.1, 0.15, 0.25, 0.3] {
            advance(Duration::from_millis(50)).await;
            engine.on_update(&c, 1, distance).await.unwrap();
        }
        // Only the first sample got through, the rest are held
        assert_eq!(levels(&mock), vec![102]);
        assert_eq!(engine.state(&key).unwrap().samples().len(), 3);
        assert!(engine.state(&key).unwrap().next_at().is_some());

        // Window ends at 250 ms: average of 0.2, 0.4, 0.2
        let event = timers.recv().await.unwrap();
        assert_eq!(event.kind, TimerKind::Throttle);
        engine.on_timer(event).await.unwrap();
        assert_eq!(levels(&mock), vec![102, 68]);
        assert!(engine.state(&key).unwrap().samples().is_empty());

        // Second window closes with nothing pending, then the channel times out
        let event = timers.recv().await.unwrap();
        assert_eq!(event.kind, TimerKind::Throttle);
        engine.on_timer(event).await.unwrap();
        assert_eq!(levels(&mock), vec![102, 68]);
        assert!(engine.state(&key).unwrap().next_at().is_none());

        let event = timers.recv().await.unwrap();
        assert_eq!(event.kind, TimerKind::Timeout);
        engine.on_timer(event).await.unwrap();
        assert_eq!(levels(&mock), vec![102, 68, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unthrottled_flushes_every_sample() {
        let mock = MockConnection::new();
        let c = controller(&mock).await;
        let (mut engine, _timers) = engine();

        engine.on_update(&c, 0, 0.0).await.unwrap();
        for distance in [0.1, 0.15, 0.25] {
            advance(Duration::from_millis(50)).await;
            engine.on_update(&c, 0, distance).await.unwrap();
        }
        assert_eq!(levels(&mock), vec![102, 51, 102]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_throttle_ignored() {
        let mock = MockConnection::new();
        let c = controller(&mock).await;
        let (mut engine, _timers) = engine();

        engine.on_update(&c, 1, 0.0).await.unwrap();
        advance(Duration::from_millis(50)).await;
        engine.on_update(&c, 1, 0.1).await.unwrap();
        advance(Duration::from_millis(50)).await;
        engine.on_update(&c, 1, 0.2).await.unwrap();

        let stale = TimerEvent {
            controller: Arc::clone(&c),
            address: 1,
            kind: TimerKind::Throttle,
            id: u64::MAX,
        };
        engine.on_timer(stale).await.unwrap();
        assert_eq!(levels(&mock), vec![102]);
        assert_eq!(engine.state(&ChannelKey::new(&c, 1)).unwrap().samples().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_address() {
        let mock = MockConnection::new();
        let c = controller(&mock).await;
        let (mut engine, _timers) = engine();
        assert!(matches!(
            engine.on_update(&c, 9, 0.5).await,
            Err(Error::ChannelNotFound { address: 9, .. })
        ));
        assert!(engine.state(&ChannelKey::new(&c, 9)).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_random_throttle_window() {
        let mock = MockConnection::new();
        let c = windowed(&mock).await;
        let (mut engine, mut timers) = patient_engine();
        let key = ChannelKey::new(&c, 0);

        engine.on_update(&c, 0, 0.0).await.unwrap();
        advance(Duration::from_millis(50)).await;
        let flushed_at = Instant::now();
        engine.on_update(&c, 0, 0.1).await.unwrap();
        assert_eq!(levels(&mock), vec![102]);

        // Intensity 0.4 bounds the window to 0.6 * 0.5 s
        let Some(release) = engine.state(&key).unwrap().next_at() else {
            return;
        };
        assert!(release > flushed_at);
        assert!(release <= flushed_at + Duration::from_millis(300));

        // Held until the window ends, whatever its length
        advance(Duration::from_millis(50)).await;
        engine.on_update(&c, 0, 0.15).await.unwrap();
        assert_eq!(levels(&mock), vec![102]);
        assert_eq!(engine.state(&key).unwrap().samples().len(), 1);

        let event = timers.recv().await.unwrap();
        assert_eq!(event.kind, TimerKind::Throttle);
        engine.on_timer(event).await.unwrap();
        assert_eq!(levels(&mock), vec![102, 51]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stall_inside_throttle_window() {
        let mock = MockConnection::new();
        let c = windowed(&mock).await;
        let (mut engine, mut timers) = patient_engine();
        let key = ChannelKey::new(&c, 1);

        engine.on_update(&c, 1, 0.0).await.unwrap();
        advance(Duration::from_millis(50)).await;
        engine.on_update(&c, 1, 0.1).await.unwrap();
        assert_eq!(levels(&mock), vec![102]);

        // 0.2 / 0.05 s / 5 = 0.8, held by the 2 s window
        advance(Duration::from_millis(50)).await;
        engine.on_update(&c, 1, 0.3).await.unwrap();
        assert_eq!(engine.state(&key).unwrap().samples().len(), 1);

        // Gap longer than stall_time drops the held sample
        advance(Duration::from_millis(600)).await;
        engine.on_update(&c, 1, 0.5).await.unwrap();
        assert!(engine.state(&key).unwrap().samples().is_empty());

        // Sampling resumes while the window is still open
        advance(Duration::from_millis(50)).await;
        engine.on_update(&c, 1, 0.55).await.unwrap();
        advance(Duration::from_millis(50)).await;
        engine.on_update(&c, 1, 0.6).await.unwrap();
        assert_eq!(engine.state(&key).unwrap().samples().len(), 2);
        assert_eq!(levels(&mock), vec![102]);

        let event = timers.recv().await.unwrap();
        assert_eq!(event.kind, TimerKind::Throttle);
        engine.on_timer(event).await.unwrap();
        // Only the post-stall samples (0.2, 0.2) are averaged
        assert_eq!(levels(&mock), vec![102, 51]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_finite_distance_ignored() {
        let mock = MockConnection::new();
        let c = controller(&mock).await;
        let (mut engine, _timers) = engine();

        engine.on_update(&c, 0, 0.0).await.unwrap();
        advance(Duration::from_millis(50)).await;
        engine.on_update(&c, 0, f32::NAN).await.unwrap();
        assert!(mock.sent().is_empty());

        // History is intact: 0.1 over 100 ms
        advance(Duration::from_millis(50)).await;
        engine.on_update(&c, 0, 0.1).await.unwrap();
        assert_eq!(levels(&mock), vec![51]);
    }
}
