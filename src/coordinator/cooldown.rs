//! Fleet-wide cooldown.
//!
//! `Normal -> ThrottleDetected -> FleetPaused -> Waiting(until) -> Resuming -> Normal`
//!
//! One throttle signal seen by any worker pauses the whole fleet: the shared
//! flags are frozen, every worker is told to suspend in place (its checkpoint is
//! left untouched), and after the cooldown every worker is re-driven back into
//! its own checkpoint. Triggers arriving while a cooldown is already running are
//! absorbed by it.

use super::registry::Coordinator;
use super::types::{Directive, WorkerId, WorkerStatus, now_ms};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CooldownPhase {
    #[default]
    Normal,
    ThrottleDetected {
        by: WorkerId,
    },
    FleetPaused,
    Waiting {
        until: u64,
    },
    Resuming,
}

/// One pause/resume cycle, kept for the control plane and for tests.
#[derive(Debug, Clone)]
pub struct CooldownWindow {
    pub triggered_by: WorkerId,
    pub paused_at: Instant,
    pub resumed_at: Option<Instant>,
    /// The fleet was stopped during the wait and never resumed.
    pub aborted: bool,
    pub resumed_workers: usize,
}

#[derive(Debug, Default)]
pub struct CooldownState {
    pub(super) phase: CooldownPhase,
    pub(super) history: Vec<CooldownWindow>,
    /// Bumped by every fleet reset. A waiter only touches the state of the
    /// generation it was spawned in.
    pub(super) generation: u64,
}

impl Coordinator {
    /// Called by a worker that saw the throttle signal.
    ///
    /// Returns `true` if this call started a cooldown, `false` if one was
    /// already running or the fleet is stopped.
    pub async fn request_cooldown(self: &Arc<Self>, worker: &WorkerId) -> Result<bool> {
        let generation = {
            let mut state = self.cooldown_state();
            if state.phase != CooldownPhase::Normal {
                tracing::debug!(
                    "Cooldown request from {} absorbed (phase {:?})",
                    worker,
                    state.phase
                );
                return Ok(false);
            }
            state.phase = CooldownPhase::ThrottleDetected { by: worker.clone() };
            state.generation
        };

        // Subscribe before pausing so a stop racing with the pause is not missed
        let stop_rx = self.stop_signal.subscribe();
        let until = now_ms() + self.config.cooldown_ms;

        match self.pause_fleet(generation, until).await {
            Ok(true) => {}
            Ok(false) => {
                self.update_window(generation, |state| state.phase = CooldownPhase::Normal);
                return Ok(false);
            }
            Err(e) => {
                self.update_window(generation, |state| state.phase = CooldownPhase::Normal);
                return Err(e);
            }
        }

        let current = self.update_window(generation, |state| {
            state.phase = CooldownPhase::FleetPaused;
            state.history.push(CooldownWindow {
                triggered_by: worker.clone(),
                paused_at: Instant::now(),
                resumed_at: None,
                aborted: false,
                resumed_workers: 0,
            });
        });
        if !current {
            tracing::debug!("Fleet was reset while {} paused it", worker);
            return Ok(false);
        }

        self.events.warn(
            Some(worker),
            format!(
                "Throttle signal detected; fleet paused for {}s",
                self.config.cooldown().as_secs()
            ),
        );

        let coordinator = self.clone();
        tokio::spawn(async move {
            coordinator.wait_and_resume(generation, until, stop_rx).await;
        });

        Ok(true)
    }

    pub fn cooldown_phase(&self) -> CooldownPhase {
        self.cooldown_state().phase.clone()
    }

    pub fn cooldown_history(&self) -> Vec<CooldownWindow> {
        self.cooldown_state().history.clone()
    }

    pub(super) fn reset_cooldown(&self) {
        let mut state = self.cooldown_state();
        state.phase = CooldownPhase::Normal;
        state.history.clear();
        state.generation += 1;
    }

    fn cooldown_state(&self) -> std::sync::MutexGuard<'_, CooldownState> {
        self.cooldown.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Applies `update` only if no fleet reset happened since `generation`.
    fn update_window(&self, generation: u64, update: impl FnOnce(&mut CooldownState)) -> bool {
        let mut state = self.cooldown_state();
        if state.generation != generation {
            return false;
        }
        update(&mut state);
        true
    }

    /// Freezes the shared flags and tells every worker to suspend.
    async fn pause_fleet(&self, generation: u64, until: u64) -> Result<bool> {
        let _guard = self.registry_guard.lock().await;

        // start_fleet resets the generation under the same guard
        if self.cooldown_state().generation != generation {
            return Ok(false);
        }

        let mut flags = self.load_flags().await?;
        if flags.stop_requested {
            tracing::info!("Throttle signal ignored: fleet is stopped");
            return Ok(false);
        }

        flags.frozen = true;
        flags.cooldown_until = Some(until);
        self.save_flags(&mut flags).await?;

        let suspended = self.mailboxes.broadcast(Directive::Suspend);
        tracing::info!("Suspended {} workers until {}", suspended, until);

        Ok(true)
    }

    async fn wait_and_resume(
        self: Arc<Self>,
        generation: u64,
        until: u64,
        mut stop_rx: watch::Receiver<u64>,
    ) {
        if !self.update_window(generation, |state| state.phase = CooldownPhase::Waiting { until }) {
            return;
        }

        let interrupted = tokio::select! {
            _ = tokio::time::sleep(self.config.cooldown()) => false,
            _ = stop_rx.changed() => true,
        };

        let stopped = interrupted
            || match self.load_flags().await {
                Ok(flags) => flags.stop_requested,
                Err(e) => {
                    tracing::error!("Cannot read flags after cooldown: {}", e);
                    true
                }
            };

        if stopped {
            let current = self.update_window(generation, |state| {
                state.phase = CooldownPhase::Normal;
                if let Some(window) = state.history.last_mut() {
                    window.aborted = true;
                }
            });
            if current {
                self.events.warn(None, "Cooldown aborted: fleet was stopped");
            } else {
                tracing::debug!("Cooldown of a replaced fleet ended");
            }
            return;
        }

        if !self.update_window(generation, |state| state.phase = CooldownPhase::Resuming) {
            return;
        }

        let resumed = match self.resume_fleet(generation).await {
            Ok(resumed) => resumed,
            Err(e) => {
                tracing::error!("Failed to resume fleet: {}", e);
                0
            }
        };

        self.update_window(generation, |state| {
            state.phase = CooldownPhase::Normal;
            if let Some(window) = state.history.last_mut() {
                window.resumed_at = Some(Instant::now());
                window.resumed_workers = resumed;
            }
        });
    }

    /// Clears the pause and re-drives every live worker into its checkpoint.
    async fn resume_fleet(&self, generation: u64) -> Result<usize> {
        let workers: Vec<WorkerId> = {
            let _guard = self.registry_guard.lock().await;

            if self.cooldown_state().generation != generation {
                tracing::debug!("Resume skipped: the fleet was replaced");
                return Ok(0);
            }

            let mut flags = self.load_flags().await?;
            flags.frozen = false;
            flags.cooldown_until = None;
            self.save_flags(&mut flags).await?;

            self.load_registry()
                .await?
                .workers
                .values()
                .filter(|record| {
                    !matches!(record.status, WorkerStatus::Failed | WorkerStatus::Stopped)
                })
                .map(|record| record.id.clone())
                .collect()
        };

        let mut resumed = 0;
        for worker in &workers {
            match self
                .mailboxes
                .deliver_with_backoff(
                    worker,
                    Directive::Resume,
                    self.config.resume_attempts,
                    self.config.resume_backoff(),
                )
                .await
            {
                Ok(()) => resumed += 1,
                Err(e) => tracing::warn!(
                    "{} not re-driven ({}); it will see the cleared flags when it polls",
                    worker,
                    e
                ),
            }
        }

        self.events.info(
            None,
            format!("Cooldown over; resumed {}/{} workers", resumed, workers.len()),
        );

        Ok(resumed)
    }
}
