//! Persistent Store Module
//!
//! The single piece of shared mutable state in the system. Every worker, the
//! coordinator and the cooldown protocol read and write through it, so a worker
//! that is destroyed and recreated observes exactly what it left behind.
//!
//! ## Contents
//! - **`PersistentStore`**: the `get` / `set` / `remove` contract over JSON values.
//! - **`memory`**: `DashMap`-backed store, shared in-process.
//! - **`file`**: JSON document on disk that survives full process restarts.
//! - **`scoped`**: `ScopedStore`, the context object that namespaces keys per
//!   worker (or for the fleet itself) and adds typed load/save helpers.

pub mod file;
pub mod memory;
pub mod scoped;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use scoped::ScopedStore;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

/// Durable key/value map shared by the whole fleet.
///
/// There is no transactional guarantee across calls: callers that need a
/// read-modify-write must serialize themselves (the coordinator does).
#[async_trait]
pub trait PersistentStore: Send + Sync {
    /// Returns the subset of `keys` that currently hold a value.
    async fn get(&self, keys: &[String]) -> Result<HashMap<String, Value>>;

    /// Inserts or overwrites every entry of `entries`.
    async fn set(&self, entries: HashMap<String, Value>) -> Result<()>;

    /// Deletes `keys`. Missing keys are ignored.
    async fn remove(&self, keys: &[String]) -> Result<()>;

    /// Lists every stored key.
    async fn keys(&self) -> Result<Vec<String>>;
}

#[cfg(test)]
mod tests;
