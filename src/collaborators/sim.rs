//! Scripted target system.
//!
//! Implements every collaborator trait over an in-memory catalogue. Faults
//! (locator misses, interrupted downloads, frozen controls, throttling, login
//! trouble) are injected per artifact or per item and consumed as they fire.
//! All timing uses `tokio::time`, so tests running on paused time stay
//! deterministic.

use super::types::*;
use super::{DocumentRetrieval, PageInspector, SessionAuthenticator};
use crate::coordinator::types::{ItemId, WorkerId};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

const ARTIFACT_BYTES: usize = 4096;

/// What the target holds under one id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordShape {
    Missing,
    Empty,
    Present(Vec<SubItem>),
}

impl RecordShape {
    /// A record with `count` sub-items named `s1`, `s2`, ...
    pub fn with_sub_items(count: usize) -> Self {
        Self::Present(
            (1..=count)
                .map(|n| SubItem::new(format!("s{}", n), format!("Document {}", n)))
                .collect(),
        )
    }
}

#[derive(Debug, Clone)]
struct SimJob {
    destination: String,
    ready_at: Instant,
    interrupted: bool,
    empty: bool,
}

/// A submitted download, for assertions.
#[derive(Debug, Clone)]
pub struct Submission {
    pub destination: String,
    pub at: Instant,
}

pub struct SimulatedTarget {
    records: DashMap<ItemId, RecordShape>,
    download_latency: Duration,

    artifacts: DashMap<String, usize>,
    jobs: DashMap<JobId, SimJob>,
    next_job: AtomicU64,
    fetch_counts: DashMap<String, usize>,
    submissions: Mutex<Vec<Submission>>,

    unresolved_lookups: DashMap<ItemId, u32>,
    listing_failures: DashMap<ItemId, u32>,
    locate_misses: DashMap<String, u32>,
    interrupted_fetches: DashMap<String, u32>,
    empty_fetches: DashMap<String, u32>,
    rejected_submits: DashMap<String, u32>,
    frozen_controls: DashMap<ItemId, u32>,
    throttle_triggers: DashMap<String, Duration>,
    throttled_until: Mutex<Option<Instant>>,
    auth_script: Mutex<VecDeque<AuthOutcome>>,
}

impl SimulatedTarget {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            download_latency: Duration::from_millis(300),
            artifacts: DashMap::new(),
            jobs: DashMap::new(),
            next_job: AtomicU64::new(1),
            fetch_counts: DashMap::new(),
            submissions: Mutex::new(Vec::new()),
            unresolved_lookups: DashMap::new(),
            listing_failures: DashMap::new(),
            locate_misses: DashMap::new(),
            interrupted_fetches: DashMap::new(),
            empty_fetches: DashMap::new(),
            rejected_submits: DashMap::new(),
            frozen_controls: DashMap::new(),
            throttle_triggers: DashMap::new(),
            throttled_until: Mutex::new(None),
            auth_script: Mutex::new(VecDeque::new()),
        }
    }

    /// Ids `first..=last`, each with `sub_items` sub-items.
    pub fn uniform(first: u64, last: u64, sub_items: usize) -> Self {
        let target = Self::new();
        for id in first..=last {
            target.set_record(ItemId(id), RecordShape::with_sub_items(sub_items));
        }
        target
    }

    pub fn with_download_latency(mut self, latency: Duration) -> Self {
        self.download_latency = latency;
        self
    }

    pub fn set_record(&self, item: ItemId, shape: RecordShape) {
        self.records.insert(item, shape);
    }

    // --- Fault injection ---

    /// The existence lookup for `item` stays unresolved for `polls` answers.
    pub fn delay_existence(&self, item: ItemId, polls: u32) {
        self.unresolved_lookups.insert(item, polls);
    }

    /// The next `times` sub-item listings of this record fail to render.
    pub fn fail_listing(&self, item: ItemId, times: u32) {
        self.listing_failures.insert(item, times);
    }

    pub fn miss_locator(&self, item: ItemId, sub_id: &str, times: u32) {
        self.locate_misses.insert(self.key(item, sub_id), times);
    }

    /// The next `times` downloads of this artifact end `Interrupted`.
    pub fn interrupt_fetch(&self, item: ItemId, sub_id: &str, times: u32) {
        self.interrupted_fetches.insert(self.key(item, sub_id), times);
    }

    /// The next `times` downloads complete with zero bytes.
    pub fn empty_fetch(&self, item: ItemId, sub_id: &str, times: u32) {
        self.empty_fetches.insert(self.key(item, sub_id), times);
    }

    /// The next `times` submissions of this artifact are refused outright.
    pub fn reject_submit(&self, item: ItemId, sub_id: &str, times: u32) {
        self.rejected_submits.insert(self.key(item, sub_id), times);
    }

    pub fn freeze_controls(&self, item: ItemId, times: u32) {
        self.frozen_controls.insert(item, times);
    }

    /// The first locator lookup for this artifact starts a throttle window of
    /// `window` and finds nothing.
    pub fn throttle_on_locate(&self, item: ItemId, sub_id: &str, window: Duration) {
        self.throttle_triggers.insert(self.key(item, sub_id), window);
    }

    /// Start throttling right now.
    pub fn throttle_for(&self, window: Duration) {
        *self.throttled_until.lock().unwrap_or_else(|e| e.into_inner()) =
            Some(Instant::now() + window);
    }

    /// Outcomes returned by successive `authenticate` calls; once drained every
    /// call succeeds.
    pub fn script_auth(&self, outcomes: Vec<AuthOutcome>) {
        self.auth_script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(outcomes);
    }

    /// Pretend an earlier run already stored this artifact.
    pub fn seed_artifact(&self, item: ItemId, sub_id: &str) {
        self.artifacts.insert(self.key(item, sub_id), ARTIFACT_BYTES);
    }

    // --- Observation ---

    pub fn fetch_count(&self, item: ItemId, sub_id: &str) -> usize {
        self.fetch_counts
            .get(&self.key(item, sub_id))
            .map(|count| *count)
            .unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        self.fetch_counts.iter().map(|entry| *entry.value()).sum()
    }

    pub fn max_fetches_per_artifact(&self) -> usize {
        self.fetch_counts
            .iter()
            .map(|entry| *entry.value())
            .max()
            .unwrap_or(0)
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn has_artifact(&self, item: ItemId, sub_id: &str) -> bool {
        self.artifacts
            .get(&self.key(item, sub_id))
            .is_some_and(|size| *size > 0)
    }

    // --- Internals ---

    fn key(&self, item: ItemId, sub_id: &str) -> String {
        artifact_name(item, &SubItem::new(sub_id, ""))
    }

    fn consume(counter: &DashMap<String, u32>, key: &str) -> bool {
        match counter.get_mut(key) {
            Some(mut remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }

    /// Lands every download whose latency has elapsed.
    fn settle_jobs(&self) {
        let now = Instant::now();
        for entry in self.jobs.iter() {
            let job = entry.value();
            let stored = self
                .artifacts
                .get(&job.destination)
                .is_some_and(|size| *size > 0);
            if job.ready_at <= now && !job.interrupted && !stored {
                let size = if job.empty { 0 } else { ARTIFACT_BYTES };
                self.artifacts.insert(job.destination.clone(), size);
            }
        }
    }

    fn is_throttled(&self) -> bool {
        let until = *self.throttled_until.lock().unwrap_or_else(|e| e.into_inner());
        until.is_some_and(|until| Instant::now() < until)
    }
}

impl Default for SimulatedTarget {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageInspector for SimulatedTarget {
    async fn exists(&self, item: ItemId) -> Result<Option<bool>> {
        if let Some(mut pending) = self.unresolved_lookups.get_mut(&item)
            && *pending > 0
        {
            *pending -= 1;
            return Ok(None);
        }

        let exists = self
            .records
            .get(&item)
            .is_some_and(|shape| *shape != RecordShape::Missing);
        Ok(Some(exists))
    }

    async fn list_sub_items(&self, item: ItemId) -> Result<Vec<SubItem>> {
        if let Some(mut remaining) = self.listing_failures.get_mut(&item)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(anyhow!("sub-item list of record {} did not render", item));
        }

        match self.records.get(&item).map(|shape| shape.clone()) {
            Some(RecordShape::Present(sub_items)) => Ok(sub_items),
            Some(RecordShape::Empty) => Ok(Vec::new()),
            Some(RecordShape::Missing) | None => Err(anyhow!("record {} has no page", item)),
        }
    }

    async fn locate_artifact(&self, item: ItemId, sub: &SubItem) -> Result<Option<Locator>> {
        let key = artifact_name(item, sub);

        if let Some((_, window)) = self.throttle_triggers.remove(&key) {
            tracing::debug!("Simulated throttle starts at {}", key);
            self.throttle_for(window);
            return Ok(None);
        }
        if self.is_throttled() || Self::consume(&self.locate_misses, &key) {
            return Ok(None);
        }

        Ok(Some(Locator(format!("sim://{}", key))))
    }

    async fn detect_throttle_signal(&self) -> Result<bool> {
        Ok(self.is_throttled())
    }

    async fn controls_ready(&self, item: ItemId) -> Result<bool> {
        if let Some(mut remaining) = self.frozen_controls.get_mut(&item)
            && *remaining > 0
        {
            *remaining -= 1;
            return Ok(false);
        }
        Ok(true)
    }
}

#[async_trait]
impl DocumentRetrieval for SimulatedTarget {
    async fn submit_download(&self, locator: &Locator, destination: &str) -> Result<JobId> {
        if !locator.0.starts_with("sim://") {
            return Err(anyhow!("unknown locator {}", locator.0));
        }
        if Self::consume(&self.rejected_submits, destination) {
            return Err(anyhow!("download of {} refused", destination));
        }

        let job = JobId(format!("job-{}", self.next_job.fetch_add(1, Ordering::SeqCst)));
        let interrupted = Self::consume(&self.interrupted_fetches, destination);
        let empty = Self::consume(&self.empty_fetches, destination);

        self.jobs.insert(
            job.clone(),
            SimJob {
                destination: destination.to_string(),
                ready_at: Instant::now() + self.download_latency,
                interrupted,
                empty,
            },
        );

        *self.fetch_counts.entry(destination.to_string()).or_insert(0) += 1;
        self.submissions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Submission {
                destination: destination.to_string(),
                at: Instant::now(),
            });

        Ok(job)
    }

    async fn poll_status(&self, job: &JobId) -> Result<DownloadStatus> {
        self.settle_jobs();

        let entry = self
            .jobs
            .get(job)
            .ok_or_else(|| anyhow!("unknown job {}", job.0))?;

        if Instant::now() < entry.ready_at {
            return Ok(DownloadStatus::Pending);
        }
        if entry.interrupted {
            return Ok(DownloadStatus::Interrupted);
        }
        Ok(DownloadStatus::Complete)
    }

    async fn delete_artifact(&self, job: &JobId) -> Result<()> {
        if let Some((_, entry)) = self.jobs.remove(job) {
            self.artifacts.remove(&entry.destination);
        }
        Ok(())
    }

    async fn artifact_exists(&self, destination: &str) -> Result<bool> {
        self.settle_jobs();
        Ok(self
            .artifacts
            .get(destination)
            .is_some_and(|size| *size > 0))
    }

    async fn prior_output(&self) -> Result<Vec<PriorOutput>> {
        let mut prior: Vec<PriorOutput> = self
            .records
            .iter()
            .filter_map(|entry| match entry.value() {
                RecordShape::Present(sub_items)
                    if !sub_items.is_empty()
                        && sub_items.iter().all(|sub| {
                            self.artifacts
                                .get(&artifact_name(*entry.key(), sub))
                                .is_some_and(|size| *size > 0)
                        }) =>
                {
                    Some(PriorOutput {
                        item: *entry.key(),
                        output_ref: item_output_ref(*entry.key()),
                    })
                }
                _ => None,
            })
            .collect();

        prior.sort_by_key(|output| output.item);
        Ok(prior)
    }
}

#[async_trait]
impl SessionAuthenticator for SimulatedTarget {
    async fn authenticate(&self, worker: &WorkerId) -> Result<AuthOutcome> {
        let scripted = self
            .auth_script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();

        let outcome = scripted.unwrap_or(AuthOutcome::Established);
        tracing::trace!("Simulated login for {}: {:?}", worker, outcome);
        Ok(outcome)
    }
}
