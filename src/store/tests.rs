//! Store Module Tests
//!
//! ## Test Scopes
//! - **MemoryStore**: get/set/remove/keys semantics.
//! - **FileStore**: state survives reopening the file; corrupt files are rejected.
//! - **ScopedStore**: namespacing, typed load/save, checkpoint purge.

#[cfg(test)]
mod tests {
    use crate::coordinator::types::ContextId;
    use crate::store::{FileStore, MemoryStore, PersistentStore, ScopedStore};
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Progress {
        step: String,
        remaining: u32,
    }

    fn entries(pairs: &[(&str, serde_json::Value)]) -> HashMap<String, serde_json::Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    // ============================================================
    // TEST 1: MemoryStore
    // ============================================================

    #[tokio::test]
    async fn test_memory_store_returns_only_present_keys() {
        // ARRANGE
        let store = MemoryStore::new();
        store
            .set(entries(&[("a", json!(1)), ("b", json!("two"))]))
            .await
            .unwrap();

        // ACT
        let found = store
            .get(&["a".to_string(), "missing".to_string()])
            .await
            .unwrap();

        // ASSERT
        assert_eq!(found.len(), 1);
        assert_eq!(found["a"], json!(1));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_memory_store_overwrite_and_remove() {
        // ARRANGE
        let store = MemoryStore::new();
        store.set(entries(&[("k", json!(1))])).await.unwrap();

        // ACT
        store.set(entries(&[("k", json!(2))])).await.unwrap();
        let overwritten = store.get(&["k".to_string()]).await.unwrap();
        store
            .remove(&["k".to_string(), "never-set".to_string()])
            .await
            .unwrap();

        // ASSERT
        assert_eq!(overwritten["k"], json!(2));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_memory_store_clones_share_state() {
        // ARRANGE
        let store = MemoryStore::new();
        let other_handle = store.clone();

        // ACT
        store.set(entries(&[("shared", json!(true))])).await.unwrap();

        // ASSERT
        let keys = other_handle.keys().await.unwrap();
        assert_eq!(keys, vec!["shared".to_string()]);
    }

    // ============================================================
    // TEST 2: FileStore
    // ============================================================

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        // ARRANGE
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("fleet.json");

        {
            let store = FileStore::open(&path).await.unwrap();
            store
                .set(entries(&[("fleet::flags", json!({"stop_requested": true}))]))
                .await
                .unwrap();
        }

        // ACT
        let reopened = FileStore::open(&path).await.unwrap();
        let found = reopened.get(&["fleet::flags".to_string()]).await.unwrap();

        // ASSERT
        assert_eq!(found["fleet::flags"]["stop_requested"], json!(true));
        assert_eq!(reopened.path(), path.as_path());
    }

    #[tokio::test]
    async fn test_file_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("absent.json")).await.unwrap();

        assert!(store.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_store_rejects_corrupt_file() {
        // ARRANGE
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();

        // ACT
        let result = FileStore::open(&path).await;

        // ASSERT
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_file_store_remove_is_persisted() {
        // ARRANGE
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleet.json");
        let store = FileStore::open(&path).await.unwrap();
        store
            .set(entries(&[("a", json!(1)), ("b", json!(2))]))
            .await
            .unwrap();

        // ACT
        store.remove(&["a".to_string()]).await.unwrap();
        let reopened = FileStore::open(&path).await.unwrap();

        // ASSERT
        assert_eq!(reopened.keys().await.unwrap(), vec!["b".to_string()]);
    }

    // ============================================================
    // TEST 3: ScopedStore
    // ============================================================

    #[tokio::test]
    async fn test_scoped_store_isolates_contexts() {
        // ARRANGE
        let inner: Arc<dyn PersistentStore> = Arc::new(MemoryStore::new());
        let first = ScopedStore::for_context(inner.clone(), &ContextId::new());
        let second = ScopedStore::for_context(inner.clone(), &ContextId::new());

        let progress = Progress {
            step: "fetching".to_string(),
            remaining: 3,
        };

        // ACT
        first.save("checkpoint", &progress).await.unwrap();

        // ASSERT
        let mine: Option<Progress> = first.load("checkpoint").await.unwrap();
        let theirs: Option<Progress> = second.load("checkpoint").await.unwrap();
        assert_eq!(mine, Some(progress));
        assert_eq!(theirs, None);
    }

    #[tokio::test]
    async fn test_scoped_store_qualifies_keys() {
        let inner: Arc<dyn PersistentStore> = Arc::new(MemoryStore::new());
        let fleet = ScopedStore::fleet(inner.clone());

        fleet.save("flags", &json!({"frozen": false})).await.unwrap();

        assert_eq!(fleet.qualify("flags"), "fleet::flags");
        assert_eq!(inner.keys().await.unwrap(), vec!["fleet::flags".to_string()]);
    }

    #[tokio::test]
    async fn test_scoped_store_load_rejects_wrong_shape() {
        // ARRANGE
        let inner: Arc<dyn PersistentStore> = Arc::new(MemoryStore::new());
        let scope = ScopedStore::fleet(inner);
        scope.save("registry", &json!([1, 2, 3])).await.unwrap();

        // ACT
        let result: anyhow::Result<Option<Progress>> = scope.load("registry").await;

        // ASSERT
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_purge_removes_checkpoints_of_every_context() {
        // ARRANGE
        let inner: Arc<dyn PersistentStore> = Arc::new(MemoryStore::new());
        let fleet = ScopedStore::fleet(inner.clone());
        let a = ScopedStore::for_context(inner.clone(), &ContextId::new());
        let b = ScopedStore::for_context(inner.clone(), &ContextId::new());

        fleet.save("checkpoint", &json!("not a context key")).await.unwrap();
        a.save("checkpoint", &json!(1)).await.unwrap();
        b.save("checkpoint", &json!(2)).await.unwrap();
        b.save("notes", &json!("kept")).await.unwrap();

        // ACT
        let purged = ScopedStore::purge_context_key(&inner, "checkpoint")
            .await
            .unwrap();

        // ASSERT
        assert_eq!(purged, 2);
        assert_eq!(a.load::<u32>("checkpoint").await.unwrap(), None);
        assert_eq!(b.load::<String>("notes").await.unwrap(), Some("kept".to_string()));
        assert!(fleet.load::<String>("checkpoint").await.unwrap().is_some());
    }
}
