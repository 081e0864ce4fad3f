//! One-shot cancellable timers delivered as events
//!
//! A timer is a sleeping task that, when it wakes, posts a [`TimerEvent`] to
//! the event loop. The loop hands the event to the behavior, which accepts it
//! only if the event's id still matches the handle it holds. A cancelled or
//! superseded timer can therefore never act, even if it already fired.

use crate::core::Controller;
use crate::protocol::Address;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// What a timer does when it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Drive the channel to zero after inactivity
    Timeout,
    /// End of a rate-limit window
    Throttle,
}

/// A fired timer
#[derive(Debug, Clone)]
pub struct TimerEvent {
    pub controller: Arc<Controller>,
    pub address: Address,
    pub kind: TimerKind,
    pub id: u64,
}

/// Pending timer; dropping it cancels it
#[derive(Debug)]
pub struct TimerHandle {
    id: u64,
    deadline: Instant,
    task: JoinHandle<()>,
}

impl TimerHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// When the timer fires
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Whether `event` was produced by this timer
    pub fn matches(&self, event: &TimerEvent) -> bool {
        self.id == event.id
    }

    pub fn cancel(&self) {
        self.task.abort();
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Creates timers that report to one event channel
#[derive(Debug)]
pub struct Scheduler {
    events: mpsc::UnboundedSender<TimerEvent>,
    next_id: u64,
}

impl Scheduler {
    /// A scheduler and the receiving end of its events
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TimerEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (Self { events, next_id: 1 }, rx)
    }

    /// Arm a one-shot timer for `(controller, address)`
    pub fn schedule(
        &mut self,
        delay: Duration,
        controller: &Arc<Controller>,
        address: Address,
        kind: TimerKind,
    ) -> TimerHandle {
        let id = self.next_id;
        self.next_id += 1;

        let deadline = Instant::now() + delay;
        let event = TimerEvent {
            controller: Arc::clone(controller),
            address,
            kind,
            id,
        };
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            // Receiver gone means the loop has shut down
            let _ = events.send(event);
        });

        TimerHandle { id, deadline, task }
    }
}
