//! Directive delivery.
//!
//! Each worker owns one bounded mailbox. A worker that is being recreated has
//! no open mailbox for a short window, which is why fleet-wide resumes go
//! through `deliver_with_backoff`.

use super::types::{Directive, WorkerId};

use dashmap::DashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

const MAILBOX_CAPACITY: usize = 16;
const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("worker {0} has no open mailbox")]
    NotRegistered(WorkerId),
    #[error("mailbox of worker {0} is full")]
    Full(WorkerId),
    #[error("mailbox of worker {0} is closed")]
    Closed(WorkerId),
}

#[derive(Default)]
pub struct Mailboxes {
    senders: DashMap<WorkerId, mpsc::Sender<Directive>>,
}

impl Mailboxes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a fresh mailbox for `worker`, replacing any previous one.
    pub fn open(&self, worker: &WorkerId) -> mpsc::Receiver<Directive> {
        let (sender, receiver) = mpsc::channel(MAILBOX_CAPACITY);
        self.senders.insert(worker.clone(), sender);
        receiver
    }

    pub fn close(&self, worker: &WorkerId) {
        self.senders.remove(worker);
    }

    pub fn clear(&self) {
        self.senders.clear();
    }

    pub fn is_open(&self, worker: &WorkerId) -> bool {
        self.senders
            .get(worker)
            .map(|sender| !sender.is_closed())
            .unwrap_or(false)
    }

    pub fn send(&self, worker: &WorkerId, directive: Directive) -> Result<(), DeliveryError> {
        let sender = self
            .senders
            .get(worker)
            .ok_or_else(|| DeliveryError::NotRegistered(worker.clone()))?;

        sender.try_send(directive).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full(worker.clone()),
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed(worker.clone()),
        })
    }

    /// Best-effort send to every open mailbox. Returns how many accepted it.
    pub fn broadcast(&self, directive: Directive) -> usize {
        let workers: Vec<WorkerId> = self.senders.iter().map(|e| e.key().clone()).collect();

        workers
            .iter()
            .filter(|worker| match self.send(worker, directive) {
                Ok(()) => true,
                Err(e) => {
                    tracing::debug!("Broadcast of {:?} skipped: {}", directive, e);
                    false
                }
            })
            .count()
    }

    /// Retries delivery with exponential backoff until the worker's mailbox
    /// accepts the directive or `attempts` run out.
    pub async fn deliver_with_backoff(
        &self,
        worker: &WorkerId,
        directive: Directive,
        attempts: u32,
        base_delay: Duration,
    ) -> Result<(), DeliveryError> {
        let mut delay = base_delay;
        let mut last_error = DeliveryError::NotRegistered(worker.clone());

        for attempt in 0..attempts.max(1) {
            match self.send(worker, directive) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::debug!(
                        "Delivery of {:?} to {} failed (attempt {}): {}",
                        directive,
                        worker,
                        attempt + 1,
                        e
                    );
                    last_error = e;
                }
            }

            if attempt + 1 < attempts {
                // Small jitter so resumes do not hit every worker in the same tick
                let jitter = rand::random::<u64>() % 50;
                tokio::time::sleep(delay + Duration::from_millis(jitter)).await;
                delay = (delay * 2).min(MAX_BACKOFF);
            }
        }

        Err(last_error)
    }
}
