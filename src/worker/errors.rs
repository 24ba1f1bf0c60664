use crate::coordinator::types::ItemId;

use thiserror::Error;

/// Everything that can interrupt a worker step.
///
/// `NotFound` and `Empty` are normal outcomes that free the item. `Stopped` and
/// `Redrive` are control flow raised by the signal checks, not failures.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("record {0} does not exist")]
    NotFound(ItemId),

    #[error("record {0} has nothing to process")]
    Empty(ItemId),

    /// The page did not render what the step needs. Retried briefly, then
    /// with the long local pause.
    #[error("page not ready: {0}")]
    TransientUi(String),

    /// Retrieval controls rendered but cannot be used. Goes straight to the
    /// long local pause.
    #[error("controls frozen: {0}")]
    ControlsFrozen(String),

    /// A download failed, stalled or came back empty. Re-enters the sub-item.
    #[error("fetch failed: {0}")]
    FetchFailure(String),

    /// The target is throttling us; the whole fleet has to cool down.
    #[error("target is rate limiting requests")]
    RateLimited,

    /// Halts this worker only.
    #[error("fatal: {0}")]
    Fatal(String),

    #[error("stop requested")]
    Stopped,

    /// Woken after a fleet pause; re-enter the stored checkpoint.
    #[error("re-driven into checkpoint")]
    Redrive,

    #[error("registry unavailable: {0}")]
    Registry(#[from] anyhow::Error),
}

pub type WorkerResult<T> = std::result::Result<T, WorkerError>;
