use super::PersistentStore;

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// In-process store. Clones share the same underlying map, so a worker task
/// recreated with a clone sees everything its predecessor wrote.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl PersistentStore for MemoryStore {
    async fn get(&self, keys: &[String]) -> Result<HashMap<String, Value>> {
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.entries.get(key) {
                found.insert(key.clone(), value.value().clone());
            }
        }
        Ok(found)
    }

    async fn set(&self, entries: HashMap<String, Value>) -> Result<()> {
        for (key, value) in entries {
            self.entries.insert(key, value);
        }
        Ok(())
    }

    async fn remove(&self, keys: &[String]) -> Result<()> {
        for key in keys {
            self.entries.remove(key);
        }
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.iter().map(|entry| entry.key().clone()).collect())
    }
}
