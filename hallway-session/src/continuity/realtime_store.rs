use crate::error::StoreError;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::trace;

/// Low-latency key/value store used as the fast snapshot tier.
#[async_trait]
pub trait RealtimeStore: Send + Sync {
    async fn set_value(&self, path: &str, value: Value) -> Result<(), StoreError>;

    /// Read the current value once and detach.
    async fn get_once(&self, path: &str) -> Result<Option<Value>, StoreError>;
}

struct RealtimeInner {
    values: DashMap<String, Value>,
    writes: DashMap<String, usize>,
    available: AtomicBool,
    read_delay_ms: AtomicU64,
}

/// Process-local [`RealtimeStore`]. Can be taken offline or slowed down to exercise the
/// fallback path.
#[derive(Clone)]
pub struct InMemoryRealtimeStore {
    inner: Arc<RealtimeInner>,
}

impl InMemoryRealtimeStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RealtimeInner {
                values: DashMap::new(),
                writes: DashMap::new(),
                available: AtomicBool::new(true),
                read_delay_ms: AtomicU64::new(0),
            }),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    /// Delay every `get_once` by `delay`.
    pub fn set_read_delay(&self, delay: Duration) {
        self.inner
            .read_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn write_count(&self, path: &str) -> usize {
        self.inner.writes.get(path).map(|n| *n).unwrap_or(0)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.inner.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("realtime store offline".into()))
        }
    }
}

impl Default for InMemoryRealtimeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RealtimeStore for InMemoryRealtimeStore {
    async fn set_value(&self, path: &str, value: Value) -> Result<(), StoreError> {
        self.check_available()?;
        trace!("realtime set {}", path);
        self.inner.values.insert(path.to_string(), value);
        *self.inner.writes.entry(path.to_string()).or_insert(0) += 1;
        Ok(())
    }

    async fn get_once(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let delay = self.inner.read_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.check_available()?;
        Ok(self.inner.values.get(path).map(|v| v.clone()))
    }
}
