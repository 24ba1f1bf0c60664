use crate::collaborators::{JobId, Locator, SubItem};
use crate::coordinator::types::{ItemId, Outcome, WorkerId, now_ms};

use serde::{Deserialize, Serialize};

/// Where a worker is in its pipeline.
///
/// Stored in the checkpoint before the step runs, so a recreated worker
/// re-enters exactly here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    Init,
    Authenticating,
    AwaitingAssignment,
    Identifying { item: ItemId },
    Enumerating { item: ItemId },
    /// Working on the first entry of `Checkpoint::remaining`.
    PerSubItem { item: ItemId, step: SubItemStep },
    Reporting { item: ItemId, outcome: Outcome },
    Terminal,
}

impl Phase {
    pub fn item(&self) -> Option<ItemId> {
        match self {
            Phase::Identifying { item }
            | Phase::Enumerating { item }
            | Phase::PerSubItem { item, .. }
            | Phase::Reporting { item, .. } => Some(*item),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum SubItemStep {
    Checking,
    LocatingArtifact,
    Fetching { locator: Locator },
    Verifying { job: JobId },
}

/// Durable progress record of one worker execution context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    pub worker: WorkerId,
    pub phase: Phase,
    /// Sub-items of the current item still to process, in order.
    pub remaining: Vec<SubItem>,
    /// Scoped fetch recoveries spent on the current sub-item.
    pub retries: u32,
    /// Quick UI retries spent on the current phase.
    #[serde(default)]
    pub ui_retries: u32,
    pub updated_at: u64,
}

impl Checkpoint {
    pub fn new(worker: WorkerId) -> Self {
        Self {
            worker,
            phase: Phase::Init,
            remaining: Vec::new(),
            retries: 0,
            ui_retries: 0,
            updated_at: now_ms(),
        }
    }

    pub fn advance(&mut self, phase: Phase) {
        if self.phase != phase {
            self.ui_retries = 0;
        }
        self.phase = phase;
    }

    pub fn item(&self) -> Option<ItemId> {
        self.phase.item()
    }

    pub fn current_sub_item(&self) -> Option<&SubItem> {
        self.remaining.first()
    }

    /// Drops the finished sub-item and moves to the next one, or to reporting
    /// once the list is exhausted.
    pub fn complete_current(&mut self, item: ItemId) {
        if !self.remaining.is_empty() {
            self.remaining.remove(0);
        }
        self.retries = 0;
        self.ui_retries = 0;
        self.phase = if self.remaining.is_empty() {
            Phase::Reporting {
                item,
                outcome: Outcome::Success,
            }
        } else {
            Phase::PerSubItem {
                item,
                step: SubItemStep::Checking,
            }
        };
    }
}

/// How a worker task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// The coordinator ran out of work.
    Finished,
    Stopped,
    Failed(String),
    /// The execution context is not (or no longer) part of the fleet.
    Detached,
}
