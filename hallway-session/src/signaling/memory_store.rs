use crate::error::StoreError;
use crate::signaling::document_store::{Change, ChangeKind, ChangeStream, DocumentStore};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::{debug, trace};

#[derive(Default)]
struct MemoryData {
    documents: HashMap<String, Value>,
    collections: HashMap<String, Vec<(String, Value)>>,
}

struct MemoryInner {
    data: Mutex<MemoryData>,
    document_watchers: DashMap<String, Vec<mpsc::UnboundedSender<Change>>>,
    collection_watchers: DashMap<String, Vec<mpsc::UnboundedSender<Change>>>,
    writes: DashMap<String, usize>,
    next_entry: AtomicU64,
    available: AtomicBool,
    duplicate_delivery: AtomicBool,
}

/// In-process [`DocumentStore`].
///
/// Backs the demo CLI and the tests. Besides the store contract it can simulate an outage
/// and duplicate change delivery, and it counts writes and live watchers per path.
#[derive(Clone)]
pub struct InMemoryDocumentStore {
    inner: Arc<MemoryInner>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                data: Mutex::new(MemoryData::default()),
                document_watchers: DashMap::new(),
                collection_watchers: DashMap::new(),
                writes: DashMap::new(),
                next_entry: AtomicU64::new(1),
                available: AtomicBool::new(true),
                duplicate_delivery: AtomicBool::new(false),
            }),
        }
    }

    /// While unavailable every operation fails with [`StoreError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    /// Deliver every change twice to watchers.
    pub fn set_duplicate_delivery(&self, enabled: bool) {
        self.inner.duplicate_delivery.store(enabled, Ordering::SeqCst);
    }

    /// Number of `set`/`update` calls that reached `path`.
    pub fn write_count(&self, path: &str) -> usize {
        self.inner.writes.get(path).map(|n| *n).unwrap_or(0)
    }

    /// Live watchers of a document or collection path.
    pub fn watcher_count(&self, path: &str) -> usize {
        let count = |map: &DashMap<String, Vec<mpsc::UnboundedSender<Change>>>| {
            map.get(path)
                .map(|senders| senders.iter().filter(|tx| !tx.is_closed()).count())
                .unwrap_or(0)
        };
        count(&self.inner.document_watchers) + count(&self.inner.collection_watchers)
    }

    /// Live watchers across every path.
    pub fn total_watchers(&self) -> usize {
        let count = |map: &DashMap<String, Vec<mpsc::UnboundedSender<Change>>>| -> usize {
            map.iter()
                .map(|entry| entry.value().iter().filter(|tx| !tx.is_closed()).count())
                .sum()
        };
        count(&self.inner.document_watchers) + count(&self.inner.collection_watchers)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.inner.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("in-memory store offline".into()))
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryData> {
        self.inner.data.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record_write(&self, path: &str) {
        *self.inner.writes.entry(path.to_string()).or_insert(0) += 1;
    }

    /// Must be called with the data lock held so watchers observe store order.
    fn notify(
        &self,
        watchers: &DashMap<String, Vec<mpsc::UnboundedSender<Change>>>,
        path: &str,
        change: Change,
    ) {
        let copies = if self.inner.duplicate_delivery.load(Ordering::SeqCst) {
            2
        } else {
            1
        };
        if let Some(mut senders) = watchers.get_mut(path) {
            senders.retain(|tx| (0..copies).all(|_| tx.send(change.clone()).is_ok()));
        }
    }

    fn register(
        watchers: &DashMap<String, Vec<mpsc::UnboundedSender<Change>>>,
        path: &str,
    ) -> (mpsc::UnboundedSender<Change>, mpsc::UnboundedReceiver<Change>) {
        let (tx, rx) = mpsc::unbounded_channel();
        watchers.entry(path.to_string()).or_default().push(tx.clone());
        (tx, rx)
    }

    fn into_stream(rx: mpsc::UnboundedReceiver<Change>) -> ChangeStream {
        futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|change| (change, rx))
        })
        .boxed()
    }

    fn write_document(&self, path: &str, value: Value) {
        let mut data = self.lock();
        self.write_locked(&mut data, path, value);
    }

    /// Must be called with the data lock held.
    fn write_locked(&self, data: &mut MemoryData, path: &str, value: Value) {
        let existed = data.documents.insert(path.to_string(), value.clone()).is_some();
        self.record_write(path);
        let kind = if existed {
            ChangeKind::Modified
        } else {
            ChangeKind::Added
        };
        self.notify(
            &self.inner.document_watchers,
            path,
            Change {
                kind,
                id: path.to_string(),
                data: Some(value),
            },
        );
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        self.check_available()?;
        Ok(self.lock().documents.get(path).cloned())
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        self.check_available()?;
        trace!("set {}", path);
        self.write_document(path, value);
        Ok(())
    }

    async fn create(&self, path: &str, value: Value) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut data = self.lock();
        if data.documents.contains_key(path) {
            trace!("create {} skipped, already exists", path);
            return Ok(false);
        }
        self.write_locked(&mut data, path, value);
        Ok(true)
    }

    async fn set_with_server_time(
        &self,
        path: &str,
        mut value: Value,
        field: &str,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        match value.as_object_mut() {
            Some(obj) => {
                obj.insert(field.to_string(), Value::from(now_millis()));
            }
            None => {
                return Err(StoreError::Conflict {
                    path: path.to_string(),
                    reason: "server timestamp requires an object document".into(),
                });
            }
        }
        self.write_document(path, value);
        Ok(())
    }

    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<(), StoreError> {
        self.check_available()?;
        let mut data = self.lock();
        let Some(doc) = data.documents.get_mut(path) else {
            return Err(StoreError::NotFound(path.to_string()));
        };
        let Some(obj) = doc.as_object_mut() else {
            return Err(StoreError::Conflict {
                path: path.to_string(),
                reason: "cannot merge fields into a non-object document".into(),
            });
        };
        obj.extend(fields);
        let snapshot = doc.clone();
        self.record_write(path);
        self.notify(
            &self.inner.document_watchers,
            path,
            Change {
                kind: ChangeKind::Modified,
                id: path.to_string(),
                data: Some(snapshot),
            },
        );
        Ok(())
    }

    async fn update_if_absent(
        &self,
        path: &str,
        field: &str,
        value: Value,
    ) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut data = self.lock();
        let Some(doc) = data.documents.get_mut(path) else {
            return Err(StoreError::NotFound(path.to_string()));
        };
        let Some(obj) = doc.as_object_mut() else {
            return Err(StoreError::Conflict {
                path: path.to_string(),
                reason: "cannot set a field on a non-object document".into(),
            });
        };
        if obj.get(field).is_some_and(|v| !v.is_null()) {
            trace!("{}.{} already set", path, field);
            return Ok(false);
        }
        obj.insert(field.to_string(), value);
        let snapshot = doc.clone();
        self.record_write(path);
        self.notify(
            &self.inner.document_watchers,
            path,
            Change {
                kind: ChangeKind::Modified,
                id: path.to_string(),
                data: Some(snapshot),
            },
        );
        Ok(true)
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        self.check_available()?;
        let mut data = self.lock();
        if data.documents.remove(path).is_some() {
            debug!("deleted {}", path);
            self.notify(
                &self.inner.document_watchers,
                path,
                Change {
                    kind: ChangeKind::Removed,
                    id: path.to_string(),
                    data: None,
                },
            );
        }
        Ok(())
    }

    async fn append(&self, collection: &str, value: Value) -> Result<String, StoreError> {
        self.check_available()?;
        let mut data = self.lock();
        let seq = self.inner.next_entry.fetch_add(1, Ordering::SeqCst);
        let id = format!("{:020}", seq);
        data.collections
            .entry(collection.to_string())
            .or_default()
            .push((id.clone(), value.clone()));
        self.notify(
            &self.inner.collection_watchers,
            collection,
            Change {
                kind: ChangeKind::Added,
                id: id.clone(),
                data: Some(value),
            },
        );
        Ok(id)
    }

    async fn list(&self, collection: &str) -> Result<Vec<(String, Value)>, StoreError> {
        self.check_available()?;
        Ok(self
            .lock()
            .collections
            .get(collection)
            .cloned()
            .unwrap_or_default())
    }

    async fn clear_collection(&self, collection: &str) -> Result<(), StoreError> {
        self.check_available()?;
        let mut data = self.lock();
        let Some(entries) = data.collections.remove(collection) else {
            return Ok(());
        };
        for (id, _) in entries {
            self.notify(
                &self.inner.collection_watchers,
                collection,
                Change {
                    kind: ChangeKind::Removed,
                    id,
                    data: None,
                },
            );
        }
        Ok(())
    }

    async fn watch_document(&self, path: &str) -> Result<ChangeStream, StoreError> {
        self.check_available()?;
        let data = self.lock();
        let (tx, rx) = Self::register(&self.inner.document_watchers, path);
        if let Some(current) = data.documents.get(path) {
            let _ = tx.send(Change {
                kind: ChangeKind::Added,
                id: path.to_string(),
                data: Some(current.clone()),
            });
        }
        debug!("watching document {}", path);
        Ok(Self::into_stream(rx))
    }

    async fn watch_collection(&self, collection: &str) -> Result<ChangeStream, StoreError> {
        self.check_available()?;
        let data = self.lock();
        let (tx, rx) = Self::register(&self.inner.collection_watchers, collection);
        for (id, value) in data.collections.get(collection).into_iter().flatten() {
            let _ = tx.send(Change {
                kind: ChangeKind::Added,
                id: id.clone(),
                data: Some(value.clone()),
            });
        }
        debug!("watching collection {}", collection);
        Ok(Self::into_stream(rx))
    }
}
