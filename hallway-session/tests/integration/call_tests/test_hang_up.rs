use hallway_core::CandidateSide;
use hallway_session::{CallError, CallPhase, DocumentStore};

use crate::integration::{CallHarness, init_tracing, room_key};

#[tokio::test]
async fn test_hang_up_twice_leaves_no_subscriptions() {
    init_tracing();

    let harness = CallHarness::new(2);
    let key = room_key();
    let alice = harness.session();
    let bob = harness.session();
    alice.start_call(&key).await.unwrap();
    bob.join_call(&key).await.unwrap();
    assert!(alice.connected().await);

    // room + remote log, per side
    assert_eq!(harness.store.total_watchers(), 4);

    alice.hang_up().await;
    alice.hang_up().await;
    bob.hang_up().await;
    bob.hang_up().await;

    assert_eq!(harness.store.total_watchers(), 0);
    assert_eq!(alice.phase(), CallPhase::Closed);
    assert_eq!(bob.phase(), CallPhase::Closed);
    assert!(harness.factory.connection(0).is_closed());
    assert!(harness.factory.connection(1).is_closed());

    assert!(harness.channel.read_room(&key).await.unwrap().is_none());
    for side in [CandidateSide::Caller, CandidateSide::Callee] {
        assert!(
            harness
                .store
                .list(&side.collection_path(&key))
                .await
                .unwrap()
                .is_empty()
        );
    }
}

#[tokio::test]
async fn test_callee_hang_up_leaves_room_to_caller() {
    init_tracing();

    let harness = CallHarness::new(1);
    let key = room_key();
    let alice = harness.session();
    let bob = harness.session();
    alice.start_call(&key).await.unwrap();
    bob.join_call(&key).await.unwrap();

    bob.hang_up().await;
    assert!(harness.channel.read_room(&key).await.unwrap().is_some());
    assert_eq!(harness.store.watcher_count(&key.document_path()), 1);

    alice.hang_up().await;
    assert_eq!(harness.store.total_watchers(), 0);
}

#[tokio::test]
async fn test_hang_up_on_idle_session() {
    let harness = CallHarness::new(1);
    let session = harness.session();

    session.hang_up().await;
    session.hang_up().await;
    assert_eq!(session.phase(), CallPhase::Closed);

    assert!(matches!(
        session.start_call(&room_key()).await,
        Err(CallError::AlreadyStarted)
    ));
    assert_eq!(harness.store.write_count(&room_key().document_path()), 0);
}
