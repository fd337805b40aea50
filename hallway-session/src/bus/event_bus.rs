use hallway_core::BusEvent;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

const DEFAULT_CAPACITY: usize = 256;

/// In-process publish/subscribe dispatcher for [`BusEvent`]s.
///
/// Cloning yields another handle to the same bus. Each component receives the bus it should
/// talk to, so tests can run isolated instances side by side. Events are delivered to the
/// subscribers present at publish time; nothing is kept for late subscribers.
#[derive(Clone)]
pub struct EventBus {
    tx: Arc<broadcast::Sender<BusEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx: Arc::new(tx) }
    }

    /// Publish to every current subscriber. Returns how many received it.
    ///
    /// Publishing with nobody listening is not an error.
    pub fn publish(&self, event: BusEvent) -> usize {
        let name = event.name();
        match self.tx.send(event) {
            Ok(n) => n,
            Err(_) => {
                debug!("No listeners for '{}'", name);
                0
            }
        }
    }

    pub fn subscribe(&self) -> BusSubscription {
        BusSubscription {
            rx: self.tx.subscribe(),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of the bus. Dropping it unsubscribes.
pub struct BusSubscription {
    rx: broadcast::Receiver<BusEvent>,
}

impl BusSubscription {
    /// Next event, or `None` once every bus handle is gone.
    ///
    /// A slow subscriber that falls behind skips the overwritten events.
    pub async fn recv(&mut self) -> Option<BusEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Bus subscriber lagged, {} events skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<BusEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!("Bus subscriber lagged, {} events skipped", skipped);
                }
                Err(_) => return None,
            }
        }
    }
}
