pub mod call_tests;

use std::sync::Arc;
use std::time::Duration;
use tracing::Level;

use hallway_core::RoomKey;
use hallway_session::{
    InMemoryDocumentStore, MediaConstraints, PeerConnectionFactory, PeerSession, SignalingChannel,
};

use crate::utils::{MockConnectionFactory, MockMediaDevices, YieldingDocumentStore};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn room_key() -> RoomKey {
    RoomKey::new("spaceX", "room1")
}

/// Two peers sharing one in-memory signaling store.
pub struct CallHarness {
    pub store: InMemoryDocumentStore,
    pub channel: SignalingChannel,
    pub factory: Arc<MockConnectionFactory>,
}

impl CallHarness {
    pub fn new(candidates_per_side: usize) -> Self {
        Self::with_factory(MockConnectionFactory::new(candidates_per_side))
    }

    pub fn with_factory(factory: MockConnectionFactory) -> Self {
        let store = InMemoryDocumentStore::new();
        Self {
            channel: SignalingChannel::new(Arc::new(store.clone())),
            store,
            factory: Arc::new(factory),
        }
    }

    /// Signaling goes through a store that yields before every call.
    pub fn yielding(candidates_per_side: usize) -> Self {
        let store = InMemoryDocumentStore::new();
        Self {
            channel: SignalingChannel::new(Arc::new(YieldingDocumentStore::new(store.clone()))),
            store,
            factory: Arc::new(MockConnectionFactory::new(candidates_per_side)),
        }
    }

    pub fn session(&self) -> PeerSession {
        self.session_with(Arc::new(MockMediaDevices::granting()))
    }

    pub fn session_with(&self, devices: Arc<MockMediaDevices>) -> PeerSession {
        let factory: Arc<dyn PeerConnectionFactory> = self.factory.clone();
        PeerSession::new(
            self.channel.clone(),
            factory,
            devices,
            MediaConstraints::default(),
        )
    }
}

/// Wait for `condition` to hold, giving background tasks time to run.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
