use crate::error::StoreError;
use crate::signaling::document_store::{ChangeKind, DocumentStore};
use futures::StreamExt;
use futures::stream::BoxStream;
use hallway_core::{CandidateSide, IceCandidate, RoomDocument, RoomKey, SessionDescription};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Typed change on a watched room document.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomChange {
    Updated(RoomDocument),
    Removed,
}

/// One entry of a candidate log together with its store-assigned id.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateEntry {
    pub id: String,
    pub candidate: IceCandidate,
}

pub type RoomWatch = BoxStream<'static, Result<RoomChange, StoreError>>;
pub type CandidateWatch = BoxStream<'static, Result<CandidateEntry, StoreError>>;

/// Room and candidate-log operations over a [`DocumentStore`].
///
/// All documents are decoded into typed structs here; a malformed document surfaces as
/// [`StoreError::Malformed`].
#[derive(Clone)]
pub struct SignalingChannel {
    store: Arc<dyn DocumentStore>,
}

impl SignalingChannel {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Create an empty room. An existing room is reused only if it holds no offer yet.
    pub async fn create_room(&self, key: &RoomKey) -> Result<(), StoreError> {
        let path = key.document_path();
        let doc = encode(&path, &RoomDocument::default())?;
        if self.store.create(&path, doc).await? {
            info!("Created room {}", key);
            return Ok(());
        }

        let existing = self.read_room(key).await?;
        if existing.is_some_and(|room| room.offer.is_some()) {
            return Err(StoreError::Conflict {
                path,
                reason: "room already has an offer".into(),
            });
        }
        debug!("Reusing empty room {}", key);
        Ok(())
    }

    pub async fn read_room(&self, key: &RoomKey) -> Result<Option<RoomDocument>, StoreError> {
        let path = key.document_path();
        match self.store.get(&path).await? {
            Some(value) => decode(&path, value).map(Some),
            None => Ok(None),
        }
    }

    /// Write the caller's offer. Rejected if the room already carries one.
    pub async fn write_offer(
        &self,
        key: &RoomKey,
        offer: &SessionDescription,
    ) -> Result<(), StoreError> {
        self.write_once(key, "offer", offer).await?;
        info!("Offer written to {}", key);
        Ok(())
    }

    /// Write the callee's answer. The room must exist and hold no answer yet.
    pub async fn write_answer(
        &self,
        key: &RoomKey,
        answer: &SessionDescription,
    ) -> Result<(), StoreError> {
        self.write_once(key, "answer", answer).await?;
        info!("Answer written to {}", key);
        Ok(())
    }

    pub async fn append_candidate(
        &self,
        key: &RoomKey,
        side: CandidateSide,
        candidate: &IceCandidate,
    ) -> Result<String, StoreError> {
        let collection = side.collection_path(key);
        let value = encode(&collection, candidate)?;
        self.store.append(&collection, value).await
    }

    /// Current and future states of the room document.
    pub async fn watch_room(&self, key: &RoomKey) -> Result<RoomWatch, StoreError> {
        let path = key.document_path();
        let changes = self.store.watch_document(&path).await?;
        Ok(changes
            .map(move |change| match (change.kind, change.data) {
                (ChangeKind::Removed, _) | (_, None) => Ok(RoomChange::Removed),
                (_, Some(value)) => decode(&path, value).map(RoomChange::Updated),
            })
            .boxed())
    }

    /// Every entry of one candidate log, existing ones first, in append order.
    pub async fn watch_candidates(
        &self,
        key: &RoomKey,
        side: CandidateSide,
    ) -> Result<CandidateWatch, StoreError> {
        let collection = side.collection_path(key);
        let changes = self.store.watch_collection(&collection).await?;
        Ok(changes
            .filter_map(move |change| {
                let entry = match (change.kind, change.data) {
                    (ChangeKind::Added, Some(value)) => Some(
                        decode(&collection, value)
                            .map(|candidate| CandidateEntry {
                                id: change.id,
                                candidate,
                            }),
                    ),
                    _ => None,
                };
                futures::future::ready(entry)
            })
            .boxed())
    }

    /// Remove the room document and both candidate logs.
    pub async fn delete_room(&self, key: &RoomKey) -> Result<(), StoreError> {
        self.store.delete(&key.document_path()).await?;
        self.store
            .clear_collection(&CandidateSide::Caller.collection_path(key))
            .await?;
        self.store
            .clear_collection(&CandidateSide::Callee.collection_path(key))
            .await?;
        info!("Room {} torn down", key);
        Ok(())
    }

    /// Check and write happen in one store operation, so of two racing writers exactly one
    /// wins and the other gets `Conflict`.
    async fn write_once(
        &self,
        key: &RoomKey,
        field: &str,
        desc: &SessionDescription,
    ) -> Result<(), StoreError> {
        let path = key.document_path();
        let value = encode(&path, desc)?;
        if self.store.update_if_absent(&path, field, value).await? {
            Ok(())
        } else {
            Err(StoreError::Conflict {
                path,
                reason: format!("{field} already written"),
            })
        }
    }
}

fn encode<T: serde::Serialize>(path: &str, value: &T) -> Result<Value, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::malformed(path, e))
}

fn decode<T: serde::de::DeserializeOwned>(path: &str, value: Value) -> Result<T, StoreError> {
    serde_json::from_value(value).map_err(|e| StoreError::malformed(path, e))
}
