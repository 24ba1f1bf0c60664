//! Fleet Runner
//!
//! Owns the worker tasks of one process. Registration and assignment live in
//! the coordinator; the runner only launches tasks, staggering their start so
//! the target never sees every worker log in at once, and recreates a task in
//! its old execution context when asked to.

use crate::collaborators::Collaborators;
use crate::coordinator::Coordinator;
use crate::coordinator::types::{
    ContextId, Directive, FleetSnapshot, ItemId, WorkerId, WorkerRecord,
};
use crate::worker::{Worker, WorkerExit};

use anyhow::{Result, anyhow};
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

struct WorkerHandle {
    worker: WorkerId,
    task: JoinHandle<WorkerExit>,
}

pub struct Fleet {
    coordinator: Arc<Coordinator>,
    collaborators: Collaborators,
    /// Live worker tasks keyed by the execution context they run in.
    handles: DashMap<ContextId, WorkerHandle>,
    launcher: Mutex<Option<JoinHandle<()>>>,
}

impl Fleet {
    pub fn new(coordinator: Arc<Coordinator>, collaborators: Collaborators) -> Arc<Self> {
        Arc::new(Self {
            coordinator,
            collaborators,
            handles: DashMap::new(),
            launcher: Mutex::new(None),
        })
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    /// Registers a fresh fleet and launches its workers one by one.
    ///
    /// Returns as soon as the fleet is registered; launching continues in the
    /// background.
    pub async fn start(
        self: &Arc<Self>,
        worker_count: usize,
        start_id: ItemId,
        max_id: Option<ItemId>,
    ) -> Result<Vec<WorkerRecord>> {
        self.abort_all().await;

        let seed = if self.coordinator.config().seed_from_output {
            self.collaborators
                .retrieval
                .prior_output()
                .await?
                .into_iter()
                .map(|prior| (prior.item, Some(prior.output_ref)))
                .collect()
        } else {
            Vec::new()
        };

        let records = self
            .coordinator
            .start_fleet(worker_count, start_id, max_id, seed)
            .await?;

        let fleet = self.clone();
        let to_launch = records.clone();
        let stagger = self.coordinator.config().stagger();

        let launcher = tokio::spawn(async move {
            for (slot, record) in to_launch.iter().enumerate() {
                if slot > 0 {
                    tokio::time::sleep(stagger).await;
                }
                if fleet.coordinator.flags().await.is_ok_and(|f| f.stop_requested) {
                    tracing::info!("Fleet stopped during launch; {} not started", record.id);
                    break;
                }

                let task = fleet.spawn_worker(record);
                fleet.handles.insert(
                    record.context.clone(),
                    WorkerHandle {
                        worker: record.id.clone(),
                        task,
                    },
                );
            }
            tracing::info!("Launched {} workers", fleet.handles.len());
        });

        *self.launcher_slot() = Some(launcher);
        Ok(records)
    }

    pub async fn stop(&self) -> Result<()> {
        self.coordinator.broadcast_stop().await
    }

    pub async fn resume(&self) -> Result<()> {
        self.coordinator.clear_stop().await
    }

    /// Kills the task running in `context` and starts a new one there.
    ///
    /// The new task knows nothing but its context; everything else comes from
    /// the checkpoint and the registry.
    pub async fn restart_worker(&self, context: &ContextId) -> Result<WorkerId> {
        let record = self
            .coordinator
            .get_assignment(context)
            .await?
            .ok_or_else(|| anyhow!("context {} is not part of the fleet", context))?;

        if let Some((_, old)) = self.handles.remove(context) {
            old.task.abort();
            let _ = old.task.await;
            tracing::info!("Killed task of {}", old.worker);
        }

        let task = self.spawn_worker(&record);
        self.handles.insert(
            context.clone(),
            WorkerHandle {
                worker: record.id.clone(),
                task,
            },
        );

        tracing::info!("Recreated {} in context {}", record.id, context);
        Ok(record.id)
    }

    /// Waits until every launched worker task has ended.
    pub async fn wait_all(&self) -> Vec<(WorkerId, WorkerExit)> {
        let launcher = self.launcher_slot().take();
        if let Some(launcher) = launcher
            && let Err(e) = launcher.await
        {
            tracing::warn!("Launcher ended abnormally: {}", e);
        }

        let mut exits = Vec::new();
        loop {
            let next = self.handles.iter().next().map(|entry| entry.key().clone());
            let Some(context) = next else {
                break;
            };
            let Some((_, handle)) = self.handles.remove(&context) else {
                continue;
            };

            match handle.task.await {
                Ok(exit) => exits.push((handle.worker, exit)),
                Err(e) if e.is_cancelled() => {}
                Err(e) => exits.push((handle.worker, WorkerExit::Failed(e.to_string()))),
            }
        }

        exits.sort_by(|a, b| a.0.cmp(&b.0));
        exits
    }

    pub async fn snapshot(&self) -> Result<FleetSnapshot> {
        self.coordinator.snapshot().await
    }

    fn spawn_worker(&self, record: &WorkerRecord) -> JoinHandle<WorkerExit> {
        let mailbox = self.coordinator.open_mailbox(&record.id);
        if let Err(e) = self.coordinator.send_directive(&record.id, Directive::Init) {
            tracing::warn!("Init for {} not delivered: {}", record.id, e);
        }

        let worker = Worker::new(
            record.id.clone(),
            record.context.clone(),
            self.coordinator.clone(),
            self.collaborators.clone(),
            mailbox,
        );

        tokio::spawn(worker.run())
    }

    async fn abort_all(&self) {
        let launcher = self.launcher_slot().take();
        if let Some(launcher) = launcher {
            launcher.abort();
        }

        let contexts: Vec<ContextId> = self.handles.iter().map(|e| e.key().clone()).collect();
        for context in contexts {
            if let Some((_, handle)) = self.handles.remove(&context) {
                handle.task.abort();
                let _ = handle.task.await;
            }
        }
    }

    fn launcher_slot(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.launcher.lock().unwrap_or_else(|e| e.into_inner())
    }
}
