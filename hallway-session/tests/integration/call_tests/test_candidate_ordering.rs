use std::time::Duration;

use hallway_core::{CandidateSide, SessionDescription};

use crate::integration::{CallHarness, eventually, init_tracing, room_key};
use crate::utils::MockPeerConnection;

#[tokio::test]
async fn test_candidates_before_answer_are_buffered() {
    init_tracing();

    let harness = CallHarness::new(0);
    let key = room_key();
    let alice = harness.session();
    alice.start_call(&key).await.unwrap();

    let early = [
        MockPeerConnection::candidate("remote", 0),
        MockPeerConnection::candidate("remote", 1),
    ];
    for candidate in &early {
        harness
            .channel
            .append_candidate(&key, CandidateSide::Callee, candidate)
            .await
            .unwrap();
    }

    tokio::time::sleep(Duration::from_millis(20)).await;
    let caller_pc = harness.factory.connection(0);
    assert_eq!(alice.applied_candidates(), 0);
    assert!(caller_pc.applied_candidates().is_empty());

    harness
        .channel
        .write_answer(&key, &SessionDescription::answer("v=0 o=remote answer"))
        .await
        .unwrap();
    assert!(alice.connected().await);

    assert!(eventually(|| caller_pc.applied_candidates().len() == 2).await);
    assert_eq!(caller_pc.applied_candidates(), early.to_vec());

    alice.hang_up().await;
}

#[tokio::test]
async fn test_candidates_after_answer_apply_immediately() {
    init_tracing();

    let harness = CallHarness::new(0);
    let key = room_key();
    let alice = harness.session();
    alice.start_call(&key).await.unwrap();
    harness
        .channel
        .write_answer(&key, &SessionDescription::answer("v=0 o=remote answer"))
        .await
        .unwrap();
    assert!(alice.connected().await);

    let late = MockPeerConnection::candidate("remote", 7);
    harness
        .channel
        .append_candidate(&key, CandidateSide::Callee, &late)
        .await
        .unwrap();
    assert!(eventually(|| alice.applied_candidates() == 1).await);

    // Same candidate under a new entry id is not applied again.
    harness
        .channel
        .append_candidate(&key, CandidateSide::Callee, &late)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(alice.applied_candidates(), 1);
    assert_eq!(harness.factory.connection(0).applied_candidates(), vec![late]);

    alice.hang_up().await;
}

#[tokio::test]
async fn test_own_candidates_are_ignored() {
    init_tracing();

    let harness = CallHarness::new(2);
    let key = room_key();
    let alice = harness.session();
    alice.start_call(&key).await.unwrap();
    harness
        .channel
        .write_answer(&key, &SessionDescription::answer("v=0 o=remote answer"))
        .await
        .unwrap();
    assert!(alice.connected().await);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(alice.applied_candidates(), 0);

    alice.hang_up().await;
}
