use std::sync::Arc;
use std::time::Duration;

use hallway_session::{
    CallPhase, InMemoryDocumentStore, MediaConstraints, MediaDevices, PeerConnectionFactory,
    PeerSession, RtcConnectionFactory, SignalingChannel, SyntheticMediaDevices, TransportConfig,
};

use crate::integration::{init_tracing, room_key};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_webrtc_sessions_negotiate_over_memory_store() {
    init_tracing();

    let store = InMemoryDocumentStore::new();
    let channel = SignalingChannel::new(Arc::new(store.clone()));
    let factory: Arc<dyn PeerConnectionFactory> =
        Arc::new(RtcConnectionFactory::new(TransportConfig::local_only()));
    let devices: Arc<dyn MediaDevices> = Arc::new(SyntheticMediaDevices::default());

    let alice = PeerSession::new(
        channel.clone(),
        Arc::clone(&factory),
        Arc::clone(&devices),
        MediaConstraints::default(),
    );
    let bob = PeerSession::new(
        channel.clone(),
        factory,
        devices,
        MediaConstraints::default(),
    );

    let key = room_key();
    alice.start_call(&key).await.expect("caller setup failed");
    bob.join_call(&key).await.expect("callee setup failed");

    let connected = tokio::time::timeout(Duration::from_secs(10), alice.connected())
        .await
        .expect("answer never applied");
    assert!(connected);
    assert_eq!(bob.phase(), CallPhase::Connected);

    let room = channel.read_room(&key).await.unwrap().unwrap();
    let offer = room.offer.unwrap();
    assert!(offer.sdp.contains("m=audio"));
    assert!(offer.sdp.contains("m=video"));

    alice.hang_up().await;
    bob.hang_up().await;
    assert_eq!(store.total_watchers(), 0);
}
