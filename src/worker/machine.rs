//! Worker pipeline.
//!
//! `Init -> Authenticating -> AwaitingAssignment -> Identifying -> Enumerating
//! -> PerSubItem(Checking -> LocatingArtifact -> Fetching -> Verifying) ->
//! Reporting -> AwaitingAssignment -> ... -> Terminal`
//!
//! One step runs at a time and the checkpoint is saved after every step, so a
//! worker task that is killed and recreated in the same execution context picks
//! up at the step it was about to run. Fetch-side steps always start with the
//! idempotence check against the output namespace.

use super::checkpoint::CheckpointStore;
use super::errors::{WorkerError, WorkerResult};
use super::signals::Signals;
use super::types::*;
use crate::collaborators::{
    AuthOutcome, Collaborators, DownloadStatus, JobId, Locator, SubItem, artifact_name,
    item_output_ref,
};
use crate::config::FleetConfig;
use crate::coordinator::Coordinator;
use crate::coordinator::types::{
    Assignment, ContextId, Directive, ItemId, Outcome, WorkerId, WorkerStatus,
};

use std::sync::Arc;
use tokio::sync::mpsc;

pub struct Worker {
    id: WorkerId,
    context: ContextId,
    coordinator: Arc<Coordinator>,
    collaborators: Collaborators,
    checkpoints: CheckpointStore,
    signals: Signals,
    config: FleetConfig,
}

impl Worker {
    pub fn new(
        id: WorkerId,
        context: ContextId,
        coordinator: Arc<Coordinator>,
        collaborators: Collaborators,
        mailbox: mpsc::Receiver<Directive>,
    ) -> Self {
        let checkpoints = CheckpointStore::new(coordinator.raw_store(), &context);
        let signals = Signals::new(id.clone(), mailbox, coordinator.clone());
        let config = coordinator.config().clone();

        Self {
            id,
            context,
            coordinator,
            collaborators,
            checkpoints,
            signals,
            config,
        }
    }

    /// Runs the pipeline until the fleet runs out of work, a stop, or a fatal
    /// error.
    pub async fn run(mut self) -> WorkerExit {
        let mut checkpoint = match self.resume_point().await {
            Ok(Some(checkpoint)) => checkpoint,
            Ok(None) => {
                tracing::warn!("Context {} is not part of the fleet", self.context);
                return WorkerExit::Detached;
            }
            Err(e) => {
                tracing::error!("{} cannot read its checkpoint: {}", self.id, e);
                return WorkerExit::Failed(e.to_string());
            }
        };

        tracing::info!("{} started at {:?}", self.id, checkpoint.phase);

        loop {
            let mut outcome = match self.signals.boundary().await {
                Ok(()) => self.step(&mut checkpoint).await,
                Err(e) => Err(e),
            };

            while let Err(err) = outcome {
                outcome = match err {
                    WorkerError::Stopped => {
                        tracing::info!("{} stopped at {:?}", self.id, checkpoint.phase);
                        return WorkerExit::Stopped;
                    }
                    WorkerError::Fatal(reason) => return self.halt(reason).await,
                    WorkerError::Registry(e) => return self.halt(e.to_string()).await,
                    other => self.recover(other, &mut checkpoint).await,
                };
            }

            if checkpoint.phase == Phase::Terminal {
                return self.finish().await;
            }

            if let Err(e) = self.checkpoints.save(&mut checkpoint).await {
                return self.halt(format!("checkpoint write failed: {}", e)).await;
            }
        }
    }

    /// The stored checkpoint, or a fresh one for a context the coordinator
    /// knows about.
    async fn resume_point(&self) -> anyhow::Result<Option<Checkpoint>> {
        if let Some(checkpoint) = self.checkpoints.load().await? {
            tracing::info!("{} resuming from checkpoint {:?}", self.id, checkpoint.phase);
            return Ok(Some(checkpoint));
        }

        let Some(record) = self.coordinator.get_assignment(&self.context).await? else {
            return Ok(None);
        };

        let mut checkpoint = Checkpoint::new(record.id);
        if record.status != WorkerStatus::Initializing {
            // Recreated before the first checkpoint write; Init was already seen
            checkpoint.advance(Phase::Authenticating);
        }
        self.checkpoints.save(&mut checkpoint).await?;
        Ok(Some(checkpoint))
    }

    async fn step(&mut self, checkpoint: &mut Checkpoint) -> WorkerResult<()> {
        match checkpoint.phase.clone() {
            Phase::Init => {
                self.signals.await_init().await?;
                self.coordinator.acknowledge_init(&self.id).await?;
                checkpoint.advance(Phase::Authenticating);
            }
            Phase::Authenticating => {
                self.authenticate().await?;
                checkpoint.advance(Phase::AwaitingAssignment);
            }
            Phase::AwaitingAssignment => {
                let next = self.next_assignment().await?;
                checkpoint.remaining.clear();
                checkpoint.retries = 0;
                checkpoint.advance(match next {
                    Some(item) => Phase::Identifying { item },
                    None => Phase::Terminal,
                });
            }
            Phase::Identifying { item } => {
                self.identify(item).await?;
                checkpoint.advance(Phase::Enumerating { item });
            }
            Phase::Enumerating { item } => {
                checkpoint.remaining = self.enumerate(item).await?;
                checkpoint.advance(Phase::PerSubItem {
                    item,
                    step: SubItemStep::Checking,
                });
            }
            Phase::PerSubItem { item, step } => self.sub_item_step(checkpoint, item, step).await?,
            Phase::Reporting { item, outcome } => {
                self.report(item, outcome).await?;
                checkpoint.remaining.clear();
                checkpoint.retries = 0;
                checkpoint.advance(Phase::AwaitingAssignment);
            }
            Phase::Terminal => {}
        }
        Ok(())
    }

    // --- Steps ---

    async fn authenticate(&mut self) -> WorkerResult<()> {
        let attempts = self.config.auth_attempts.max(1);

        for attempt in 1..=attempts {
            match self.collaborators.authenticator.authenticate(&self.id).await {
                Ok(AuthOutcome::Established) => {
                    tracing::debug!("{} authenticated", self.id);
                    return Ok(());
                }
                Ok(AuthOutcome::Rejected(reason)) => {
                    return Err(WorkerError::Fatal(format!("login rejected: {}", reason)));
                }
                Ok(AuthOutcome::FormMissing) => {
                    tracing::warn!("{} login form missing (attempt {})", self.id, attempt);
                }
                Err(e) => {
                    tracing::warn!("{} login failed (attempt {}): {}", self.id, attempt, e);
                }
            }

            if attempt < attempts {
                self.signals.pause(self.config.auth_retry()).await?;
            }
        }

        Err(WorkerError::Fatal(format!(
            "could not authenticate after {} attempts",
            attempts
        )))
    }

    /// Picks up an item this worker already holds, otherwise asks for a new one.
    async fn next_assignment(&self) -> WorkerResult<Option<ItemId>> {
        if let Some(record) = self.coordinator.get_assignment(&self.context).await?
            && record.status == WorkerStatus::Working
            && let Some(item) = record.current_item
        {
            tracing::info!("{} still holds item {}", self.id, item);
            return Ok(Some(item));
        }

        match self.coordinator.request_work(&self.id).await? {
            Assignment::Assigned(item) => {
                self.coordinator
                    .events()
                    .info(Some(&self.id), format!("Processing record {}", item));
                Ok(Some(item))
            }
            Assignment::Done => {
                // A stop answers Done too; that must not retire the member
                if self.coordinator.flags().await?.stop_requested {
                    return Err(WorkerError::Stopped);
                }
                Ok(None)
            }
        }
    }

    async fn identify(&mut self, item: ItemId) -> WorkerResult<()> {
        if self.throttled().await? {
            return Err(WorkerError::RateLimited);
        }

        let inspector = self.collaborators.inspector.clone();
        for poll in 1..=self.config.existence_polls {
            match inspector.exists(item).await {
                Ok(Some(true)) => return Ok(()),
                Ok(Some(false)) => return Err(WorkerError::NotFound(item)),
                Ok(None) => tracing::trace!("Existence of {} unresolved (poll {})", item, poll),
                Err(e) => tracing::debug!("Existence lookup for {} failed: {}", item, e),
            }
            self.signals.pause(self.config.existence_poll()).await?;
        }

        tracing::debug!("Existence of {} never resolved", item);
        Err(WorkerError::NotFound(item))
    }

    async fn enumerate(&self, item: ItemId) -> WorkerResult<Vec<SubItem>> {
        let sub_items = self
            .collaborators
            .inspector
            .list_sub_items(item)
            .await
            .map_err(|e| WorkerError::TransientUi(e.to_string()))?;

        if sub_items.is_empty() {
            return Err(WorkerError::Empty(item));
        }

        tracing::debug!("Record {} has {} sub-items", item, sub_items.len());
        Ok(sub_items)
    }

    async fn sub_item_step(
        &mut self,
        checkpoint: &mut Checkpoint,
        item: ItemId,
        step: SubItemStep,
    ) -> WorkerResult<()> {
        let Some(sub) = checkpoint.current_sub_item().cloned() else {
            checkpoint.complete_current(item);
            return Ok(());
        };
        let destination = artifact_name(item, &sub);

        if self.already_stored(&destination).await? {
            tracing::debug!("{} already stored, skipping", destination);
            checkpoint.complete_current(item);
            return Ok(());
        }

        let next = match step {
            SubItemStep::Checking => SubItemStep::LocatingArtifact,
            SubItemStep::LocatingArtifact => {
                let locator = self.locate(item, &sub).await?;
                SubItemStep::Fetching { locator }
            }
            SubItemStep::Fetching { locator } => {
                let job = self
                    .collaborators
                    .retrieval
                    .submit_download(&locator, &destination)
                    .await
                    .map_err(|e| WorkerError::FetchFailure(e.to_string()))?;
                tracing::debug!("{} submitted {} as {}", self.id, destination, job.0);
                SubItemStep::Verifying { job }
            }
            SubItemStep::Verifying { job } => {
                self.verify(&job, &destination).await?;
                self.coordinator
                    .events()
                    .info(Some(&self.id), format!("Stored {}", destination));
                checkpoint.complete_current(item);
                return Ok(());
            }
        };

        checkpoint.advance(Phase::PerSubItem { item, step: next });
        Ok(())
    }

    async fn already_stored(&self, destination: &str) -> WorkerResult<bool> {
        self.collaborators
            .retrieval
            .artifact_exists(destination)
            .await
            .map_err(|e| WorkerError::FetchFailure(e.to_string()))
    }

    async fn locate(&mut self, item: ItemId, sub: &SubItem) -> WorkerResult<Locator> {
        let inspector = self.collaborators.inspector.clone();

        let ready = inspector
            .controls_ready(item)
            .await
            .map_err(|e| WorkerError::TransientUi(e.to_string()))?;
        if !ready {
            return Err(WorkerError::ControlsFrozen(format!(
                "retrieval controls of record {} are unresponsive",
                item
            )));
        }

        let attempts = self.config.locate_attempts.max(1);
        for attempt in 1..=attempts {
            match inspector.locate_artifact(item, sub).await {
                Ok(Some(locator)) => return Ok(locator),
                Ok(None) => tracing::debug!(
                    "No locator for {} of {} (attempt {}/{})",
                    sub.id,
                    item,
                    attempt,
                    attempts
                ),
                Err(e) => tracing::debug!("Locating {} of {} failed: {}", sub.id, item, e),
            }

            if self.throttled().await? {
                return Err(WorkerError::RateLimited);
            }
            if attempt < attempts {
                self.signals.pause(self.config.locate_backoff()).await?;
            }
        }

        tracing::warn!(
            "{} gave up locating {} of {}; escalating to a cooldown",
            self.id,
            sub.id,
            item
        );
        Err(WorkerError::RateLimited)
    }

    async fn verify(&mut self, job: &JobId, destination: &str) -> WorkerResult<()> {
        let retrieval = self.collaborators.retrieval.clone();

        for _ in 0..self.config.fetch_poll_limit {
            let status = retrieval
                .poll_status(job)
                .await
                .map_err(|e| WorkerError::FetchFailure(e.to_string()))?;

            match status {
                DownloadStatus::Complete => {
                    if self.already_stored(destination).await? {
                        return Ok(());
                    }
                    self.discard(job).await;
                    return Err(WorkerError::FetchFailure(format!(
                        "{} arrived empty",
                        destination
                    )));
                }
                DownloadStatus::Interrupted => {
                    self.discard(job).await;
                    return Err(WorkerError::FetchFailure(format!(
                        "{} was interrupted",
                        destination
                    )));
                }
                DownloadStatus::Pending => {
                    if self.throttled().await? {
                        return Err(WorkerError::RateLimited);
                    }
                    self.signals.pause(self.config.fetch_poll()).await?;
                }
            }
        }

        Err(WorkerError::FetchFailure(format!(
            "{} still pending after {} polls",
            destination, self.config.fetch_poll_limit
        )))
    }

    /// Removes whatever a failed download left behind.
    async fn discard(&self, job: &JobId) {
        if let Err(e) = self.collaborators.retrieval.delete_artifact(job).await {
            tracing::debug!("Cleanup of {} failed: {}", job.0, e);
        }
    }

    async fn report(&self, item: ItemId, outcome: Outcome) -> WorkerResult<()> {
        match outcome {
            Outcome::Success => {
                self.coordinator
                    .complete_work(&self.id, item, outcome, Some(item_output_ref(item)))
                    .await?;
                self.coordinator
                    .events()
                    .info(Some(&self.id), format!("Completed record {}", item));
            }
            Outcome::NotFound => {
                self.coordinator.release_not_found(&self.id, item).await?;
                self.coordinator
                    .events()
                    .info(Some(&self.id), format!("Record {} does not exist", item));
            }
            Outcome::Empty => {
                self.coordinator.release_empty(&self.id, item).await?;
                self.coordinator
                    .events()
                    .info(Some(&self.id), format!("Record {} has no documents", item));
            }
        }
        Ok(())
    }

    async fn throttled(&self) -> WorkerResult<bool> {
        match self.collaborators.inspector.detect_throttle_signal().await {
            Ok(throttled) => Ok(throttled),
            Err(e) => {
                tracing::debug!("Throttle check failed: {}", e);
                Ok(false)
            }
        }
    }

    // --- Recovery ---

    async fn recover(&mut self, err: WorkerError, checkpoint: &mut Checkpoint) -> WorkerResult<()> {
        match err {
            WorkerError::NotFound(item) => {
                checkpoint.remaining.clear();
                checkpoint.advance(Phase::Reporting {
                    item,
                    outcome: Outcome::NotFound,
                });
                Ok(())
            }
            WorkerError::Empty(item) => {
                checkpoint.remaining.clear();
                checkpoint.advance(Phase::Reporting {
                    item,
                    outcome: Outcome::Empty,
                });
                Ok(())
            }
            WorkerError::TransientUi(reason) => self.recover_ui(reason, checkpoint).await,
            WorkerError::ControlsFrozen(reason) => self.frozen_pause(reason).await,
            WorkerError::FetchFailure(reason) => self.recover_fetch(reason, checkpoint).await,
            WorkerError::RateLimited => self.cool_down(checkpoint).await,
            WorkerError::Redrive => {
                if let Some(stored) = self.checkpoints.load().await? {
                    *checkpoint = stored;
                }
                tracing::debug!("{} re-driven into {:?}", self.id, checkpoint.phase);
                Ok(())
            }
            other => Err(other),
        }
    }

    /// Retries the same phase after a short pause; past the ceiling falls back
    /// to the long local pause.
    async fn recover_ui(
        &mut self,
        reason: String,
        checkpoint: &mut Checkpoint,
    ) -> WorkerResult<()> {
        checkpoint.ui_retries += 1;

        if checkpoint.ui_retries > self.config.ui_retry_limit {
            checkpoint.ui_retries = 0;
            self.checkpoints.save(checkpoint).await?;
            return self.frozen_pause(reason).await;
        }

        tracing::debug!(
            "{}: {} (retry {}/{})",
            self.id,
            reason,
            checkpoint.ui_retries,
            self.config.ui_retry_limit
        );
        self.checkpoints.save(checkpoint).await?;
        self.signals.pause(self.config.ui_retry()).await
    }

    async fn frozen_pause(&mut self, reason: String) -> WorkerResult<()> {
        self.coordinator.events().warn(
            Some(&self.id),
            format!(
                "{}; pausing {}s",
                reason,
                self.config.frozen_pause().as_secs()
            ),
        );
        self.signals.pause(self.config.frozen_pause()).await
    }

    /// Re-enters the current sub-item after a fetch went wrong; repeated
    /// failures on the same sub-item are treated like throttling.
    async fn recover_fetch(
        &mut self,
        reason: String,
        checkpoint: &mut Checkpoint,
    ) -> WorkerResult<()> {
        tracing::warn!("{}: {}", self.id, reason);

        if let Some(item) = checkpoint.item() {
            checkpoint.advance(Phase::PerSubItem {
                item,
                step: SubItemStep::Checking,
            });
        }
        checkpoint.retries += 1;

        if checkpoint.retries > self.config.fetch_recovery_limit {
            checkpoint.retries = 0;
            self.checkpoints.save(checkpoint).await?;
            return self.cool_down(checkpoint).await;
        }

        self.checkpoints.save(checkpoint).await?;
        self.signals.pause(self.config.fetch_recovery()).await
    }

    async fn cool_down(&mut self, checkpoint: &mut Checkpoint) -> WorkerResult<()> {
        self.checkpoints.save(checkpoint).await?;

        let started = self.coordinator.request_cooldown(&self.id).await?;
        if !started {
            tracing::debug!("{} joins the running cooldown", self.id);
            // The pause flags may not be written yet
            self.signals.pause(self.config.flag_poll()).await?;
        }

        self.signals.wait_for_resume().await
    }

    // --- Exit ---

    async fn finish(&self) -> WorkerExit {
        if let Err(e) = self.checkpoints.clear().await {
            tracing::warn!("{} could not clear its checkpoint: {}", self.id, e);
        }
        if let Err(e) = self.coordinator.retire_worker(&self.id).await {
            tracing::warn!("{} could not leave the fleet: {}", self.id, e);
        }
        tracing::info!("{} finished", self.id);
        WorkerExit::Finished
    }

    async fn halt(&self, reason: String) -> WorkerExit {
        if let Err(e) = self.coordinator.report_fatal(&self.id, &reason).await {
            tracing::error!("{} halted ({}) and could not report it: {}", self.id, reason, e);
        }
        WorkerExit::Failed(reason)
    }
}
