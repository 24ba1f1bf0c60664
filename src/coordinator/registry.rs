//! Work Registry
//!
//! The coordinator owns every piece of fleet-wide state: the scan pointer, the
//! per-item locks, the completed set, fleet membership and the global flags.
//! All of it lives in the persistent store as two documents (`registry` and
//! `flags`) so that a recreated worker observes the same truth as everyone else.
//!
//! ## Concurrency
//! The store offers no compare-and-swap. Every read-modify-write below runs
//! under `registry_guard`, a single async mutex, so two workers asking for work
//! at the same instant can never be handed the same id.

use super::cooldown::CooldownState;
use super::mailbox::Mailboxes;
use super::types::*;
use crate::config::FleetConfig;
use crate::events::EventBus;
use crate::store::{PersistentStore, ScopedStore};

use anyhow::{Result, bail};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, mpsc, watch};

const REGISTRY_KEY: &str = "registry";
const FLAGS_KEY: &str = "flags";
pub(crate) const CHECKPOINT_KEY: &str = "checkpoint";

/// Holder recorded for completed entries seeded from a previous run's output.
const PRIOR_RUN_HOLDER: &str = "prior-run";

pub struct Coordinator {
    pub(super) store: ScopedStore,
    pub(super) raw_store: Arc<dyn PersistentStore>,
    pub(super) registry_guard: Mutex<()>,
    pub(super) mailboxes: Mailboxes,
    pub(super) cooldown: StdMutex<CooldownState>,
    /// Bumped by every `broadcast_stop`; the cooldown waiter listens to it.
    pub(super) stop_signal: watch::Sender<u64>,
    pub(super) config: FleetConfig,
    pub(super) events: EventBus,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn PersistentStore>,
        config: FleetConfig,
        events: EventBus,
    ) -> Arc<Self> {
        let (stop_signal, _) = watch::channel(0);

        Arc::new(Self {
            store: ScopedStore::fleet(store.clone()),
            raw_store: store,
            registry_guard: Mutex::new(()),
            mailboxes: Mailboxes::new(),
            cooldown: StdMutex::new(CooldownState::default()),
            stop_signal,
            config,
            events,
        })
    }

    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn raw_store(&self) -> Arc<dyn PersistentStore> {
        self.raw_store.clone()
    }

    // --- Fleet lifecycle ---

    /// Resets the registry and registers `worker_count` fresh workers.
    ///
    /// A fleet that is still registered is stopped and torn down first. The
    /// completed set starts from `seed` (output left behind by earlier runs).
    pub async fn start_fleet(
        &self,
        worker_count: usize,
        start_id: ItemId,
        max_id: Option<ItemId>,
        seed: Vec<(ItemId, Option<String>)>,
    ) -> Result<Vec<WorkerRecord>> {
        if worker_count == 0 {
            bail!("a fleet needs at least one worker");
        }
        if start_id.0 == 0 {
            bail!("item ids start at 1");
        }
        if let Some(max) = max_id
            && max < start_id
        {
            bail!("max id {} is below start id {}", max, start_id);
        }

        let prior = self.load_registry().await?;
        let live = prior
            .workers
            .values()
            .filter(|record| record.status != WorkerStatus::Stopped)
            .count();
        if live > 0 {
            tracing::error!(
                "start_fleet called while {} workers are still registered; stopping them first",
                live
            );
            self.broadcast_stop().await?;
        }

        let _guard = self.registry_guard.lock().await;

        let purged = ScopedStore::purge_context_key(&self.raw_store, CHECKPOINT_KEY).await?;
        if purged > 0 {
            tracing::info!("Removed {} stale checkpoints", purged);
        }

        let mut registry = RegistryState {
            start_id,
            max_id,
            scan_pointer: start_id,
            version: prior.version,
            ..Default::default()
        };

        let seeded = seed.len();
        for (item, output_ref) in seed {
            registry.completed.insert(
                item,
                CompletedEntry {
                    output_ref,
                    completed_at: now_ms(),
                    holder: WorkerId(PRIOR_RUN_HOLDER.to_string()),
                },
            );
            registry.resolved.insert(item, Outcome::Success);
        }

        let records: Vec<WorkerRecord> = (0..worker_count)
            .map(|slot| WorkerRecord {
                id: WorkerId::from_slot(slot),
                context: ContextId::new(),
                status: WorkerStatus::Initializing,
                current_item: None,
            })
            .collect();

        for record in &records {
            registry.workers.insert(record.id.clone(), record.clone());
        }

        self.save_registry(&mut registry).await?;

        let mut flags = self.load_flags().await?;
        flags.stop_requested = false;
        flags.frozen = false;
        flags.cooldown_until = None;
        self.save_flags(&mut flags).await?;

        self.mailboxes.clear();
        self.reset_cooldown();

        self.events.info(
            None,
            format!(
                "Fleet started: {} workers from id {}{} ({} items already done)",
                worker_count,
                start_id,
                max_id.map(|m| format!(" to {}", m)).unwrap_or_default(),
                seeded
            ),
        );

        Ok(records)
    }

    /// Hands the next eligible id to `worker`, or `Done`.
    pub async fn request_work(&self, worker: &WorkerId) -> Result<Assignment> {
        let _guard = self.registry_guard.lock().await;

        let flags = self.load_flags().await?;
        if flags.stop_requested {
            tracing::debug!("request_work from {} refused: stop requested", worker);
            return Ok(Assignment::Done);
        }

        let mut registry = self.load_registry().await?;
        match registry.workers.get(worker) {
            None => {
                tracing::warn!("request_work from unknown worker {}", worker);
                return Ok(Assignment::Done);
            }
            Some(record) if record.status == WorkerStatus::Stopped => {
                tracing::debug!("request_work from {} refused: worker is stopped", worker);
                return Ok(Assignment::Done);
            }
            Some(_) => {}
        }

        let mut candidate = registry.scan_pointer;
        let mut probes = 0u64;

        let found = loop {
            if let Some(max) = registry.max_id
                && candidate > max
            {
                break None;
            }
            if probes >= self.config.probe_limit {
                tracing::warn!(
                    "Probe limit {} reached scanning from {}",
                    self.config.probe_limit,
                    registry.scan_pointer
                );
                break None;
            }

            // Released ids are never handed out again, whatever their outcome
            let released = registry.completed.contains_key(&candidate)
                || registry.resolved.contains_key(&candidate);
            let locked_by_other = registry
                .locks
                .get(&candidate)
                .is_some_and(|lock| &lock.holder != worker);

            if !released && !locked_by_other {
                break Some(candidate);
            }

            let Some(next) = candidate.next() else {
                break None;
            };
            candidate = next;
            probes += 1;
        };

        let Some(item) = found else {
            if let Some(record) = registry.workers.get_mut(worker) {
                record.status = WorkerStatus::Idle;
                record.current_item = None;
            }
            self.save_registry(&mut registry).await?;
            tracing::info!("No more work for {}", worker);
            return Ok(Assignment::Done);
        };

        registry.locks.insert(
            item,
            Lock {
                holder: worker.clone(),
                acquired_at: now_ms(),
            },
        );
        // Only ever moves forward
        registry.scan_pointer = registry.scan_pointer.max(item.next().unwrap_or(item));

        if let Some(record) = registry.workers.get_mut(worker) {
            record.status = WorkerStatus::Working;
            record.current_item = Some(item);
        }

        self.save_registry(&mut registry).await?;
        tracing::debug!("Assigned item {} to {}", item, worker);

        Ok(Assignment::Assigned(item))
    }

    /// Frees `item`; on `Success` records it in the completed set.
    ///
    /// Calling it again with the same arguments changes nothing.
    pub async fn complete_work(
        &self,
        worker: &WorkerId,
        item: ItemId,
        outcome: Outcome,
        output_ref: Option<String>,
    ) -> Result<()> {
        let _guard = self.registry_guard.lock().await;
        let mut registry = self.load_registry().await?;

        let held_by_other = match registry.locks.get(&item) {
            Some(lock) if &lock.holder == worker => {
                registry.locks.remove(&item);
                false
            }
            Some(lock) => {
                tracing::warn!(
                    "{} reported item {} which is locked by {}",
                    worker,
                    item,
                    lock.holder
                );
                true
            }
            None => false,
        };

        if !held_by_other {
            if outcome == Outcome::Success && !registry.completed.contains_key(&item) {
                registry.completed.insert(
                    item,
                    CompletedEntry {
                        output_ref,
                        completed_at: now_ms(),
                        holder: worker.clone(),
                    },
                );
            }
            registry.resolved.entry(item).or_insert(outcome);
        }

        if let Some(record) = registry.workers.get_mut(worker)
            && record.current_item == Some(item)
        {
            record.status = WorkerStatus::Idle;
            record.current_item = None;
        }

        self.save_registry(&mut registry).await?;
        tracing::debug!("{} released item {} ({:?})", worker, item, outcome);

        Ok(())
    }

    pub async fn release_not_found(&self, worker: &WorkerId, item: ItemId) -> Result<()> {
        self.complete_work(worker, item, Outcome::NotFound, None).await
    }

    pub async fn release_empty(&self, worker: &WorkerId, item: ItemId) -> Result<()> {
        self.complete_work(worker, item, Outcome::Empty, None).await
    }

    /// Stops the whole fleet: sets the stop flag, halts every worker and tears
    /// down its mailbox. Membership records are parked as `Stopped` with their
    /// locks, so `clear_stop` can bring them back. Safe to call repeatedly.
    pub async fn broadcast_stop(&self) -> Result<()> {
        let _guard = self.registry_guard.lock().await;

        let mut flags = self.load_flags().await?;
        let already_stopped = flags.stop_requested;
        flags.stop_requested = true;
        self.save_flags(&mut flags).await?;

        let halted = self.mailboxes.broadcast(Directive::Halt);
        self.mailboxes.clear();

        let mut registry = self.load_registry().await?;
        let mut parked = 0;
        for record in registry.workers.values_mut() {
            if matches!(record.status, WorkerStatus::Failed | WorkerStatus::Stopped) {
                continue;
            }
            record.status = WorkerStatus::Stopped;
            parked += 1;
        }
        self.save_registry(&mut registry).await?;

        self.stop_signal.send_modify(|generation| *generation += 1);

        if !already_stopped || parked > 0 {
            self.events.warn(
                None,
                format!("Fleet stopped ({} workers halted, {} members parked)", halted, parked),
            );
        }

        Ok(())
    }

    /// The explicit resume after a stop: clears the stop flag (and any pause
    /// left over from an aborted cooldown) and returns parked workers to the
    /// state they were stopped in. Their tasks still have to be recreated.
    pub async fn clear_stop(&self) -> Result<()> {
        let _guard = self.registry_guard.lock().await;

        let mut flags = self.load_flags().await?;
        flags.stop_requested = false;
        flags.frozen = false;
        flags.cooldown_until = None;
        self.save_flags(&mut flags).await?;

        let mut registry = self.load_registry().await?;
        let mut restored = 0;
        for record in registry.workers.values_mut() {
            if record.status != WorkerStatus::Stopped {
                continue;
            }
            record.status = match record.current_item {
                Some(_) => WorkerStatus::Working,
                None => WorkerStatus::Idle,
            };
            restored += 1;
        }
        if restored > 0 {
            self.save_registry(&mut registry).await?;
        }

        self.events.info(
            None,
            format!("Stop flag cleared; {} stopped workers can be restarted", restored),
        );
        Ok(())
    }

    // --- Worker lifecycle ---

    /// Looks a worker up by the execution context it runs in.
    pub async fn get_assignment(&self, context: &ContextId) -> Result<Option<WorkerRecord>> {
        let registry = self.load_registry().await?;
        Ok(registry.worker_by_context(context).cloned())
    }

    /// Opens (or reopens) the directive mailbox of `worker`.
    pub fn open_mailbox(&self, worker: &WorkerId) -> mpsc::Receiver<Directive> {
        self.mailboxes.open(worker)
    }

    pub fn send_directive(&self, worker: &WorkerId, directive: Directive) -> Result<()> {
        self.mailboxes.send(worker, directive)?;
        Ok(())
    }

    /// Marks `worker` ready once it has received its `Init` directive.
    pub async fn acknowledge_init(&self, worker: &WorkerId) -> Result<()> {
        let _guard = self.registry_guard.lock().await;
        let mut registry = self.load_registry().await?;

        if let Some(record) = registry.workers.get_mut(worker)
            && record.status == WorkerStatus::Initializing
        {
            record.status = WorkerStatus::Idle;
            self.save_registry(&mut registry).await?;
        }
        Ok(())
    }

    /// Records that `worker` halted on a fatal error. Its lock, if any, stays
    /// in place so the item shows up as stuck rather than silently skipped.
    pub async fn report_fatal(&self, worker: &WorkerId, reason: &str) -> Result<()> {
        let _guard = self.registry_guard.lock().await;
        let mut registry = self.load_registry().await?;

        if let Some(record) = registry.workers.get_mut(worker) {
            record.status = WorkerStatus::Failed;
            self.save_registry(&mut registry).await?;
        }
        self.mailboxes.close(worker);
        self.events.error(Some(worker), format!("Halted: {}", reason));
        Ok(())
    }

    /// Removes a worker that has run out of work from the fleet.
    pub async fn retire_worker(&self, worker: &WorkerId) -> Result<()> {
        let _guard = self.registry_guard.lock().await;
        let mut registry = self.load_registry().await?;

        if registry.workers.remove(worker).is_some() {
            self.save_registry(&mut registry).await?;
            self.events.info(Some(worker), "Finished: no more work");
        }
        self.mailboxes.close(worker);

        if registry.workers.is_empty() {
            self.events.info(
                None,
                format!(
                    "All workers finished ({} items completed)",
                    registry.completed.len()
                ),
            );
        }
        Ok(())
    }

    // --- Reads ---

    pub async fn flags(&self) -> Result<GlobalFlags> {
        self.load_flags().await
    }

    pub async fn registry(&self) -> Result<RegistryState> {
        self.load_registry().await
    }

    pub async fn snapshot(&self) -> Result<FleetSnapshot> {
        let registry = self.load_registry().await?;
        let flags = self.load_flags().await?;

        let by_outcome = |wanted: Outcome| -> Vec<ItemId> {
            registry
                .resolved
                .iter()
                .filter(|(_, outcome)| **outcome == wanted)
                .map(|(item, _)| *item)
                .collect()
        };

        Ok(FleetSnapshot {
            scan_pointer: registry.scan_pointer,
            max_id: registry.max_id,
            completed: registry.completed.keys().copied().collect(),
            not_found: by_outcome(Outcome::NotFound),
            empty: by_outcome(Outcome::Empty),
            locks: registry.locks.clone(),
            workers: registry.workers.values().cloned().collect(),
            flags,
        })
    }

    // --- Store access ---

    pub(super) async fn load_registry(&self) -> Result<RegistryState> {
        Ok(self.store.load(REGISTRY_KEY).await?.unwrap_or_default())
    }

    pub(super) async fn save_registry(&self, registry: &mut RegistryState) -> Result<()> {
        registry.version += 1;
        self.store.save(REGISTRY_KEY, registry).await
    }

    pub(super) async fn load_flags(&self) -> Result<GlobalFlags> {
        Ok(self.store.load(FLAGS_KEY).await?.unwrap_or_default())
    }

    pub(super) async fn save_flags(&self, flags: &mut GlobalFlags) -> Result<()> {
        flags.version += 1;
        self.store.save(FLAGS_KEY, flags).await
    }
}
