//! External Collaborators
//!
//! The coordinator and workers never talk to the target system directly. These
//! traits are the whole surface they consume:
//!
//! - **`PageInspector`**: does a record exist, what are its sub-items, where is an
//!   artifact, is the target rate limiting us.
//! - **`DocumentRetrieval`**: submits and polls artifact downloads, and answers
//!   whether an artifact already sits in the output namespace.
//! - **`SessionAuthenticator`**: establishes a session for one worker.
//!
//! `sim` provides a scripted, deterministic implementation of all three.

pub mod sim;
pub mod types;

pub use types::*;

use crate::coordinator::types::{ItemId, WorkerId};

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait PageInspector: Send + Sync {
    /// `Some(answer)` once the target has resolved the lookup, `None` while it
    /// is still loading. Callers bound how long they keep asking.
    async fn exists(&self, item: ItemId) -> Result<Option<bool>>;

    /// Sub-items of `item` in their natural order.
    async fn list_sub_items(&self, item: ItemId) -> Result<Vec<SubItem>>;

    /// Retrieval locator for one sub-item, `None` if the control is not there (yet).
    async fn locate_artifact(&self, item: ItemId, sub: &SubItem) -> Result<Option<Locator>>;

    /// Whether the target is currently rate limiting every request from us.
    async fn detect_throttle_signal(&self) -> Result<bool>;

    /// Whether the retrieval controls for `item` are usable. `false` means the
    /// page rendered but produced nothing to click.
    async fn controls_ready(&self, item: ItemId) -> Result<bool>;
}

#[async_trait]
pub trait DocumentRetrieval: Send + Sync {
    async fn submit_download(&self, locator: &Locator, destination: &str) -> Result<JobId>;

    async fn poll_status(&self, job: &JobId) -> Result<DownloadStatus>;

    /// Legacy cleanup hook; nothing in the pipeline depends on it.
    async fn delete_artifact(&self, job: &JobId) -> Result<()>;

    /// Idempotence check: is a non-empty artifact stored under `destination`?
    async fn artifact_exists(&self, destination: &str) -> Result<bool>;

    /// Items fully produced by earlier runs.
    async fn prior_output(&self) -> Result<Vec<PriorOutput>>;
}

#[async_trait]
pub trait SessionAuthenticator: Send + Sync {
    async fn authenticate(&self, worker: &WorkerId) -> Result<AuthOutcome>;
}

/// The set of collaborators handed to every worker.
#[derive(Clone)]
pub struct Collaborators {
    pub inspector: Arc<dyn PageInspector>,
    pub retrieval: Arc<dyn DocumentRetrieval>,
    pub authenticator: Arc<dyn SessionAuthenticator>,
}

impl Collaborators {
    /// Uses one object for all three roles.
    pub fn from_target<T>(target: Arc<T>) -> Self
    where
        T: PageInspector + DocumentRetrieval + SessionAuthenticator + 'static,
    {
        Self {
            inspector: target.clone(),
            retrieval: target.clone(),
            authenticator: target,
        }
    }
}
