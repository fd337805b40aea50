use async_trait::async_trait;
use hallway_core::{ParticipantId, SessionSnapshot};
use hallway_session::{ChangeStream, DocumentStore, InMemoryDocumentStore, SnapshotStore, StoreError};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Gives up the scheduler before every call, so concurrent callers interleave between
/// round trips the way they would against a remote database.
pub struct YieldingDocumentStore {
    inner: InMemoryDocumentStore,
}

impl YieldingDocumentStore {
    pub fn new(inner: InMemoryDocumentStore) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl DocumentStore for YieldingDocumentStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        tokio::task::yield_now().await;
        self.inner.get(path).await
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        self.inner.set(path, value).await
    }

    async fn create(&self, path: &str, value: Value) -> Result<bool, StoreError> {
        tokio::task::yield_now().await;
        self.inner.create(path, value).await
    }

    async fn set_with_server_time(
        &self,
        path: &str,
        value: Value,
        field: &str,
    ) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        self.inner.set_with_server_time(path, value, field).await
    }

    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        self.inner.update(path, fields).await
    }

    async fn update_if_absent(
        &self,
        path: &str,
        field: &str,
        value: Value,
    ) -> Result<bool, StoreError> {
        tokio::task::yield_now().await;
        self.inner.update_if_absent(path, field, value).await
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        self.inner.delete(path).await
    }

    async fn append(&self, collection: &str, value: Value) -> Result<String, StoreError> {
        tokio::task::yield_now().await;
        self.inner.append(collection, value).await
    }

    async fn list(&self, collection: &str) -> Result<Vec<(String, Value)>, StoreError> {
        tokio::task::yield_now().await;
        self.inner.list(collection).await
    }

    async fn clear_collection(&self, collection: &str) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        self.inner.clear_collection(collection).await
    }

    async fn watch_document(&self, path: &str) -> Result<ChangeStream, StoreError> {
        tokio::task::yield_now().await;
        self.inner.watch_document(path).await
    }

    async fn watch_collection(&self, collection: &str) -> Result<ChangeStream, StoreError> {
        tokio::task::yield_now().await;
        self.inner.watch_collection(collection).await
    }
}

/// Snapshot tier that accepts calls and never answers them.
#[derive(Default)]
pub struct HangingSnapshotStore {
    saves: AtomicUsize,
}

impl HangingSnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Saves started, none of which ever finished.
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotStore for HangingSnapshotStore {
    fn name(&self) -> &'static str {
        "hanging"
    }

    async fn save(
        &self,
        _participant: ParticipantId,
        _snapshot: &SessionSnapshot,
    ) -> Result<(), StoreError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        futures::future::pending().await
    }

    async fn load(
        &self,
        _participant: ParticipantId,
    ) -> Result<Option<SessionSnapshot>, StoreError> {
        futures::future::pending().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_yielding_store_delegates() {
        let inner = InMemoryDocumentStore::new();
        let store = YieldingDocumentStore::new(inner.clone());
        assert!(store.create("doc", json!({})).await.unwrap());
        assert!(store.update_if_absent("doc", "a", json!(1)).await.unwrap());
        assert_eq!(inner.get("doc").await.unwrap(), Some(json!({"a": 1})));
    }
}
