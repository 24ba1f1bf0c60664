//! Fleet Configuration
//!
//! Every timing constant the coordinator and the workers rely on. Values are
//! plain milliseconds so a config file stays readable; accessors hand out
//! `Duration`s.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Delay between launching consecutive workers.
    pub stagger_ms: u64,
    /// Upper bound on ids probed by one `request_work` scan.
    pub probe_limit: u64,
    /// Seed the completed set from previously produced output at fleet start.
    pub seed_from_output: bool,

    pub auth_attempts: u32,
    pub auth_retry_ms: u64,

    /// How long a worker waits for its `Init` directive before giving up.
    pub init_wait_ms: u64,

    pub existence_polls: u32,
    pub existence_poll_ms: u64,

    pub locate_attempts: u32,
    pub locate_backoff_ms: u64,

    pub fetch_poll_ms: u64,
    pub fetch_poll_limit: u32,
    /// Scoped recoveries allowed per sub-item before escalating to a cooldown.
    pub fetch_recovery_limit: u32,
    pub fetch_recovery_ms: u64,

    /// Quick local retries of a page that did not render, before falling back
    /// to `frozen_pause_ms`.
    pub ui_retry_limit: u32,
    pub ui_retry_ms: u64,
    /// Local pause when retrieval controls render but are unusable.
    pub frozen_pause_ms: u64,

    pub cooldown_ms: u64,
    pub resume_attempts: u32,
    pub resume_backoff_ms: u64,

    /// How often a suspended worker re-reads the shared flags.
    pub flag_poll_ms: u64,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            stagger_ms: 2_000,
            probe_limit: 10_000,
            seed_from_output: true,
            auth_attempts: 3,
            auth_retry_ms: 2_000,
            init_wait_ms: 30_000,
            existence_polls: 10,
            existence_poll_ms: 500,
            locate_attempts: 3,
            locate_backoff_ms: 2_000,
            fetch_poll_ms: 1_000,
            fetch_poll_limit: 120,
            fetch_recovery_limit: 3,
            fetch_recovery_ms: 5_000,
            ui_retry_limit: 3,
            ui_retry_ms: 2_000,
            frozen_pause_ms: 60_000,
            cooldown_ms: 300_000,
            resume_attempts: 5,
            resume_backoff_ms: 1_000,
            flag_poll_ms: 1_000,
        }
    }
}

impl FleetConfig {
    /// Loads a JSON config file; missing fields fall back to defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    pub fn stagger(&self) -> Duration {
        Duration::from_millis(self.stagger_ms)
    }

    pub fn auth_retry(&self) -> Duration {
        Duration::from_millis(self.auth_retry_ms)
    }

    pub fn init_wait(&self) -> Duration {
        Duration::from_millis(self.init_wait_ms)
    }

    pub fn existence_poll(&self) -> Duration {
        Duration::from_millis(self.existence_poll_ms)
    }

    pub fn locate_backoff(&self) -> Duration {
        Duration::from_millis(self.locate_backoff_ms)
    }

    pub fn fetch_poll(&self) -> Duration {
        Duration::from_millis(self.fetch_poll_ms)
    }

    pub fn fetch_recovery(&self) -> Duration {
        Duration::from_millis(self.fetch_recovery_ms)
    }

    pub fn ui_retry(&self) -> Duration {
        Duration::from_millis(self.ui_retry_ms)
    }

    pub fn frozen_pause(&self) -> Duration {
        Duration::from_millis(self.frozen_pause_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn resume_backoff(&self) -> Duration {
        Duration::from_millis(self.resume_backoff_ms)
    }

    pub fn flag_poll(&self) -> Duration {
        Duration::from_millis(self.flag_poll_ms)
    }
}
