//! Status events for the control plane.
//!
//! Observability only: nothing in the coordination contract reads them back.
//! Every event is mirrored into `tracing` at the matching level.

use crate::coordinator::types::{WorkerId, now_ms};

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;
const HISTORY_LIMIT: usize = 200;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    /// `None` for fleet-level events.
    pub worker_id: Option<WorkerId>,
    pub message: String,
    pub level: EventLevel,
    pub at: u64,
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<StatusEvent>,
    history: Arc<Mutex<VecDeque<StatusEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            history: Arc::new(Mutex::new(VecDeque::with_capacity(HISTORY_LIMIT))),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.sender.subscribe()
    }

    pub fn info(&self, worker_id: Option<&WorkerId>, message: impl Into<String>) {
        self.emit(worker_id, message.into(), EventLevel::Info);
    }

    pub fn warn(&self, worker_id: Option<&WorkerId>, message: impl Into<String>) {
        self.emit(worker_id, message.into(), EventLevel::Warn);
    }

    pub fn error(&self, worker_id: Option<&WorkerId>, message: impl Into<String>) {
        self.emit(worker_id, message.into(), EventLevel::Error);
    }

    /// Most recent events, oldest first.
    pub fn recent(&self) -> Vec<StatusEvent> {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    fn emit(&self, worker_id: Option<&WorkerId>, message: String, level: EventLevel) {
        let who = worker_id.map(|id| id.0.as_str()).unwrap_or("fleet");
        match level {
            EventLevel::Info => tracing::info!("[{}] {}", who, message),
            EventLevel::Warn => tracing::warn!("[{}] {}", who, message),
            EventLevel::Error => tracing::error!("[{}] {}", who, message),
        }

        let event = StatusEvent {
            worker_id: worker_id.cloned(),
            message,
            level,
            at: now_ms(),
        };

        {
            let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
            if history.len() == HISTORY_LIMIT {
                history.pop_front();
            }
            history.push_back(event.clone());
        }

        // No subscribers is fine.
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
