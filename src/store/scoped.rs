use super::PersistentStore;
use crate::coordinator::types::ContextId;

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;

const FLEET_SCOPE: &str = "fleet";
const CONTEXT_SCOPE_PREFIX: &str = "ctx:";
const SEPARATOR: &str = "::";

/// A view of the persistent store restricted to one namespace.
///
/// Every key passed in is prefixed with the scope, so two workers writing
/// `checkpoint` never collide.
#[derive(Clone)]
pub struct ScopedStore {
    inner: Arc<dyn PersistentStore>,
    scope: String,
}

impl ScopedStore {
    /// Namespace for fleet-wide state (registry, flags).
    pub fn fleet(inner: Arc<dyn PersistentStore>) -> Self {
        Self {
            inner,
            scope: FLEET_SCOPE.to_string(),
        }
    }

    /// Namespace owned by one worker execution context.
    pub fn for_context(inner: Arc<dyn PersistentStore>, context: &ContextId) -> Self {
        Self {
            inner,
            scope: format!("{}{}", CONTEXT_SCOPE_PREFIX, context.0),
        }
    }

    pub fn qualify(&self, key: &str) -> String {
        format!("{}{}{}", self.scope, SEPARATOR, key)
    }

    pub async fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let full_key = self.qualify(key);
        let mut found = self.inner.get(std::slice::from_ref(&full_key)).await?;

        match found.remove(&full_key) {
            Some(value) => {
                let decoded = serde_json::from_value(value)
                    .with_context(|| format!("decoding {}", full_key))?;
                Ok(Some(decoded))
            }
            None => Ok(None),
        }
    }

    pub async fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let mut entries = HashMap::with_capacity(1);
        entries.insert(self.qualify(key), serde_json::to_value(value)?);
        self.inner.set(entries).await
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.inner.remove(&[self.qualify(key)]).await
    }

    /// Removes `key` from every worker context namespace.
    ///
    /// Used when a new fleet starts and the previous fleet's contexts are gone.
    pub async fn purge_context_key(inner: &Arc<dyn PersistentStore>, key: &str) -> Result<usize> {
        let suffix = format!("{}{}", SEPARATOR, key);
        let stale: Vec<String> = inner
            .keys()
            .await?
            .into_iter()
            .filter(|k| k.starts_with(CONTEXT_SCOPE_PREFIX) && k.ends_with(&suffix))
            .collect();

        if !stale.is_empty() {
            inner.remove(&stale).await?;
        }
        Ok(stale.len())
    }
}
