use crate::continuity::realtime_store::RealtimeStore;
use crate::error::StoreError;
use crate::signaling::DocumentStore;
use async_trait::async_trait;
use hallway_core::{ParticipantId, SessionSnapshot};
use serde_json::Value;
use std::sync::Arc;

/// Server-assigned write time on durable snapshots.
///
/// Orders writes from several clients to the same durable document for anything reading
/// the store directly. [`FallbackPolicy`](crate::FallbackPolicy) does not consult it: reads
/// always prefer the realtime tier and the stamp is not part of [`SessionSnapshot`].
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// Where a participant's latest snapshot lives, in every tier.
pub fn snapshot_path(participant: ParticipantId) -> String {
    format!("sessions/{participant}")
}

/// One persistence tier for session snapshots.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &'static str;

    /// Overwrite the participant's snapshot.
    async fn save(
        &self,
        participant: ParticipantId,
        snapshot: &SessionSnapshot,
    ) -> Result<(), StoreError>;

    async fn load(&self, participant: ParticipantId) -> Result<Option<SessionSnapshot>, StoreError>;
}

/// Snapshot tier on the low-latency store.
pub struct RealtimeSnapshotStore {
    store: Arc<dyn RealtimeStore>,
}

impl RealtimeSnapshotStore {
    pub fn new(store: Arc<dyn RealtimeStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SnapshotStore for RealtimeSnapshotStore {
    fn name(&self) -> &'static str {
        "realtime"
    }

    async fn save(
        &self,
        participant: ParticipantId,
        snapshot: &SessionSnapshot,
    ) -> Result<(), StoreError> {
        let path = snapshot_path(participant);
        let value = encode(&path, snapshot)?;
        self.store.set_value(&path, value).await
    }

    async fn load(&self, participant: ParticipantId) -> Result<Option<SessionSnapshot>, StoreError> {
        let path = snapshot_path(participant);
        match self.store.get_once(&path).await? {
            Some(value) => decode(&path, value).map(Some),
            None => Ok(None),
        }
    }
}

/// Snapshot tier on the document store. Every write is stamped with the store's clock under
/// [`UPDATED_AT_FIELD`]; the stamp is dropped again on load.
pub struct DurableSnapshotStore {
    store: Arc<dyn DocumentStore>,
}

impl DurableSnapshotStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SnapshotStore for DurableSnapshotStore {
    fn name(&self) -> &'static str {
        "durable"
    }

    async fn save(
        &self,
        participant: ParticipantId,
        snapshot: &SessionSnapshot,
    ) -> Result<(), StoreError> {
        let path = snapshot_path(participant);
        let value = encode(&path, snapshot)?;
        self.store
            .set_with_server_time(&path, value, UPDATED_AT_FIELD)
            .await
    }

    async fn load(&self, participant: ParticipantId) -> Result<Option<SessionSnapshot>, StoreError> {
        let path = snapshot_path(participant);
        match self.store.get(&path).await? {
            Some(value) => decode(&path, value).map(Some),
            None => Ok(None),
        }
    }
}

fn encode(path: &str, snapshot: &SessionSnapshot) -> Result<Value, StoreError> {
    serde_json::to_value(snapshot).map_err(|e| StoreError::malformed(path, e))
}

fn decode(path: &str, value: Value) -> Result<SessionSnapshot, StoreError> {
    serde_json::from_value(value).map_err(|e| StoreError::malformed(path, e))
}
