//! Top-level orchestration
//!
//! ```text
//!  TelemetrySource ──callback──► updates ──┐
//!                                          ├──► event loop ──► Router ──► Behavior ──► Controller
//!  Scheduler timers ────────────► timers ──┘
//! ```
//!
//! All behavior work happens on the event loop, one event at a time.

use crate::behavior::{create_behavior, Behavior, Scheduler, TimerEvent};
use crate::config::Config;
use crate::core::{Controller, Router};
use crate::error::{Error, Result};
use crate::telemetry::{create_source, Callback, TelemetrySource};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// One distance reading for one telemetry path
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub path: String,
    pub distance: f32,
}

/// Wires telemetry, routing, behavior and controllers together
pub struct Manager {
    game: Box<dyn TelemetrySource>,
    router: Router,
    behavior: Box<dyn Behavior>,
    controllers: Vec<Arc<Controller>>,
    running: Arc<AtomicBool>,
    updates_tx: mpsc::UnboundedSender<Update>,
    updates_rx: mpsc::UnboundedReceiver<Update>,
    timers_rx: mpsc::UnboundedReceiver<TimerEvent>,
}

impl Manager {
    /// Assemble a manager; every controller's actuators are registered
    ///
    /// Controller names key per-channel behavior state, so they must be
    /// unique.
    ///
    /// `timers` must be the receiving end of the scheduler the behavior was
    /// built with.
    pub fn new(
        game: Box<dyn TelemetrySource>,
        mut router: Router,
        behavior: Box<dyn Behavior>,
        timers: mpsc::UnboundedReceiver<TimerEvent>,
        controllers: Vec<Arc<Controller>>,
    ) -> Result<Self> {
        let mut names = HashSet::new();
        for controller in &controllers {
            if !names.insert(controller.name()) {
                return Err(Error::DuplicateController(controller.name().to_string()));
            }
            router.add_controller(controller)?;
        }
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        Ok(Self {
            game,
            router,
            behavior,
            controllers,
            running: Arc::new(AtomicBool::new(false)),
            updates_tx,
            updates_rx,
            timers_rx: timers,
        })
    }

    /// Build everything described by `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        let game = create_source(&config.game)?;
        let (scheduler, timers) = Scheduler::channel();
        let behavior = create_behavior(&config.behavior, scheduler)?;
        let controllers = config.build_controllers()?;
        Self::new(game, config.build_router(), behavior, timers, controllers)
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn controllers(&self) -> &[Arc<Controller>] {
        &self.controllers
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Shared flag cleared by [`Manager::stop`]
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Queue an update as if the telemetry source had produced it
    pub fn update_sender(&self) -> mpsc::UnboundedSender<Update> {
        self.updates_tx.clone()
    }

    /// Connect controllers, subscribe to telemetry, start behavior then source
    ///
    /// The first controller that fails to connect aborts startup.
    pub async fn start(&mut self) -> Result<()> {
        for controller in &self.controllers {
            controller.connect().await?;
        }

        let updates = self.updates_tx.clone();
        let callback: Callback = Arc::new(move |path: &str, distance: f32| {
            let _ = updates.send(Update {
                path: path.to_string(),
                distance,
            });
        });
        self.game
            .listen_distance(self.router.prefix(), callback, true);

        self.behavior.start().await?;
        self.game.start().await?;
        self.running.store(true, Ordering::Relaxed);
        log::info!(
            "Manager started: {} controller(s), {} actuator(s)",
            self.controllers.len(),
            self.router.names().len()
        );
        Ok(())
    }

    /// Route one distance update to the behavior
    ///
    /// Paths that name no actuator, and non-finite readings, are ignored.
    pub async fn on_update(&mut self, path: &str, distance: f32) -> Result<()> {
        if !distance.is_finite() {
            log::warn!("Dropping non-finite distance for {}", path);
            return Ok(());
        }
        match self.router.resolve_path(path) {
            Some((controller, address)) => {
                self.behavior
                    .on_update(&controller, address, distance)
                    .await
            }
            None => {
                log::debug!("No actuator for {}", path);
                Ok(())
            }
        }
    }

    /// Hand a fired timer to the behavior
    pub async fn on_timer(&mut self, event: TimerEvent) -> Result<()> {
        self.behavior.on_timer(event).await
    }

    /// Process updates and timers until stopped
    ///
    /// Errors from individual events are logged and do not end the loop.
    pub async fn run(&mut self) -> Result<()> {
        while self.running.load(Ordering::Relaxed) {
            tokio::select! {
                Some(update) = self.updates_rx.recv() => self.dispatch_update(update).await,
                Some(event) = self.timers_rx.recv() => self.dispatch_timer(event).await,
                else => break,
            }
        }
        Ok(())
    }

    /// Handle every update and timer already queued, without waiting
    ///
    /// Returns the number of events handled.
    pub async fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        loop {
            if let Ok(update) = self.updates_rx.try_recv() {
                self.dispatch_update(update).await;
            } else if let Ok(event) = self.timers_rx.try_recv() {
                self.dispatch_timer(event).await;
            } else {
                return handled;
            }
            handled += 1;
        }
    }

    async fn dispatch_update(&mut self, update: Update) {
        if let Err(e) = self.on_update(&update.path, update.distance).await {
            log::error!("Update {} failed: {}", update.path, e);
        }
    }

    async fn dispatch_timer(&mut self, event: TimerEvent) {
        let name = event.controller.name().to_string();
        if let Err(e) = self.on_timer(event).await {
            log::error!("Timer for {} failed: {}", name, e);
        }
    }

    /// Stop the source, cancel timers, disconnect controllers
    ///
    /// Every step is attempted; the first error is returned.
    pub async fn stop(&mut self) -> Result<()> {
        self.running.store(false, Ordering::Relaxed);
        let mut result = self.game.stop().await;

        if let Err(e) = self.behavior.stop().await {
            log::error!("Behavior stop failed: {}", e);
            result = result.and(Err(e));
        }
        for controller in &self.controllers {
            if let Err(e) = controller.disconnect().await {
                log::error!("{}: disconnect failed: {}", controller.name(), e);
                result = result.and(Err(e));
            }
        }
        log::info!("Manager stopped");
        result
    }
}
