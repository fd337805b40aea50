use crate::error::StoreError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// One change observed on a watched document or collection.
///
/// For a document watch `id` is the document path; for a collection watch it is the
/// entry id assigned by [`DocumentStore::append`].
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub kind: ChangeKind,
    pub id: String,
    pub data: Option<Value>,
}

/// Live change feed. Dropping it unsubscribes.
pub type ChangeStream = BoxStream<'static, Change>;

/// Remote document database the signaling and durable snapshot layers sit on.
///
/// Watches first deliver the current state (as `Added`), then every later change in the
/// order the store applied it. Delivery is at least once; consumers must be idempotent.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError>;

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError>;

    /// Create the document only if nothing is stored at `path`. Returns `false`, writing
    /// nothing, when it already exists.
    async fn create(&self, path: &str, value: Value) -> Result<bool, StoreError>;

    /// Store `value` with `field` set to the store's own clock (ms since epoch).
    async fn set_with_server_time(
        &self,
        path: &str,
        value: Value,
        field: &str,
    ) -> Result<(), StoreError>;

    /// Merge `fields` into an existing document. Fails with `NotFound` if it is missing.
    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<(), StoreError>;

    /// Set one field of an existing document if it is absent or null, as a single atomic
    /// step. Returns `false`, writing nothing, when the field already holds a value. Fails
    /// with `NotFound` if the document is missing.
    async fn update_if_absent(
        &self,
        path: &str,
        field: &str,
        value: Value,
    ) -> Result<bool, StoreError>;

    async fn delete(&self, path: &str) -> Result<(), StoreError>;

    /// Append to an ordered collection and return the new entry id.
    async fn append(&self, collection: &str, value: Value) -> Result<String, StoreError>;

    async fn list(&self, collection: &str) -> Result<Vec<(String, Value)>, StoreError>;

    async fn clear_collection(&self, collection: &str) -> Result<(), StoreError>;

    async fn watch_document(&self, path: &str) -> Result<ChangeStream, StoreError>;

    async fn watch_collection(&self, collection: &str) -> Result<ChangeStream, StoreError>;
}
