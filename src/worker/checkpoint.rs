use super::types::Checkpoint;
use crate::coordinator::registry::CHECKPOINT_KEY;
use crate::coordinator::types::{ContextId, now_ms};
use crate::store::{PersistentStore, ScopedStore};

use anyhow::Result;
use std::sync::Arc;

/// Checkpoint persistence for one execution context.
#[derive(Clone)]
pub struct CheckpointStore {
    scope: ScopedStore,
}

impl CheckpointStore {
    pub fn new(inner: Arc<dyn PersistentStore>, context: &ContextId) -> Self {
        Self {
            scope: ScopedStore::for_context(inner, context),
        }
    }

    pub async fn load(&self) -> Result<Option<Checkpoint>> {
        self.scope.load(CHECKPOINT_KEY).await
    }

    pub async fn save(&self, checkpoint: &mut Checkpoint) -> Result<()> {
        checkpoint.updated_at = now_ms();
        self.scope.save(CHECKPOINT_KEY, checkpoint).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.scope.delete(CHECKPOINT_KEY).await
    }
}
