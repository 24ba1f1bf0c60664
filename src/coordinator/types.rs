use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a record in the batch.
///
/// Records are numbered from 1 upward; the upper bound is usually unknown.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ItemId(pub u64);

impl ItemId {
    /// The following id, or `None` at the end of the id space.
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self(1)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fleet-level identity of a worker (`worker-1`, `worker-2`, ...).
///
/// Stable for the lifetime of a fleet; a restarted worker recovers it through
/// [`ContextId`] lookup rather than trusting anything it held in memory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(pub String);

impl WorkerId {
    pub fn from_slot(slot: usize) -> Self {
        Self(format!("worker-{}", slot + 1))
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of the execution context a worker runs in.
///
/// Survives worker restarts (the task is recreated, the context is not), which
/// is why checkpoints and membership lookups are keyed by it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub String);

impl ContextId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a worker as seen by the coordinator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum WorkerStatus {
    /// Registered by `start_fleet`, has not acknowledged its `Init` directive yet.
    Initializing,
    /// Between items.
    Idle,
    /// Holds a lock on `current_item`.
    Working,
    /// Halted by a fatal error; never resumed automatically.
    Failed,
    /// Halted by a fleet stop. Keeps its lock and `current_item` so an explicit
    /// resume can recreate it from its checkpoint.
    Stopped,
}

/// Membership entry for one worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerRecord {
    pub id: WorkerId,
    pub context: ContextId,
    pub status: WorkerStatus,
    pub current_item: Option<ItemId>,
}

/// Advisory claim binding an item to one worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lock {
    pub holder: WorkerId,
    /// Timestamp (ms) when the lock was taken.
    pub acquired_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletedEntry {
    /// Where the produced output lives, if the producer reported it.
    pub output_ref: Option<String>,
    pub completed_at: u64,
    pub holder: WorkerId,
}

/// How a claimed item was freed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    NotFound,
    Empty,
}

/// Derived view of an item's state; never stored directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    Unassigned,
    Locked,
    Completed,
    NotFound,
    Empty,
}

/// Answer to `request_work`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    Assigned(ItemId),
    Done,
}

/// Process-wide flags shared by every worker through the persistent store.
///
/// `version` increases on every write so observers can tell a fresh value
/// from a stale one after a restart.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GlobalFlags {
    pub stop_requested: bool,
    /// Timestamp (ms) until which the fleet is cooling down.
    pub cooldown_until: Option<u64>,
    pub frozen: bool,
    pub version: u64,
}

/// The whole work registry, stored as one versioned document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryState {
    pub start_id: ItemId,
    pub max_id: Option<ItemId>,
    /// Lowest id from which the next search starts. Never decreases.
    pub scan_pointer: ItemId,
    pub locks: BTreeMap<ItemId, Lock>,
    pub completed: BTreeMap<ItemId, CompletedEntry>,
    /// Every freed id and how it was freed, completed ones included.
    pub resolved: BTreeMap<ItemId, Outcome>,
    pub workers: BTreeMap<WorkerId, WorkerRecord>,
    pub version: u64,
}

impl RegistryState {
    pub fn item_status(&self, item: ItemId) -> ItemStatus {
        if self.completed.contains_key(&item) {
            return ItemStatus::Completed;
        }
        if self.locks.contains_key(&item) {
            return ItemStatus::Locked;
        }
        match self.resolved.get(&item) {
            Some(Outcome::NotFound) => ItemStatus::NotFound,
            Some(Outcome::Empty) => ItemStatus::Empty,
            _ => ItemStatus::Unassigned,
        }
    }

    pub fn worker_by_context(&self, context: &ContextId) -> Option<&WorkerRecord> {
        self.workers.values().find(|record| &record.context == context)
    }
}

/// Read-only picture of the registry handed to the control plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetSnapshot {
    pub scan_pointer: ItemId,
    pub max_id: Option<ItemId>,
    pub completed: Vec<ItemId>,
    pub not_found: Vec<ItemId>,
    pub empty: Vec<ItemId>,
    pub locks: BTreeMap<ItemId, Lock>,
    pub workers: Vec<WorkerRecord>,
    pub flags: GlobalFlags,
}

/// Directive delivered to a worker's mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Begin the pipeline.
    Init,
    /// Fleet-wide pause; stay in place until `Resume`.
    Suspend,
    /// Re-enter the current checkpoint.
    Resume,
    /// Abandon in-flight work; no further registry calls.
    Halt,
}

/// Helper to get the current system time in milliseconds.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
