use std::time::Duration;

use hallway_core::SessionDescription;
use hallway_session::{CallError, CallPhase, StoreError};

use crate::integration::{CallHarness, init_tracing, room_key};

#[tokio::test]
async fn test_racing_answers_have_one_winner() {
    init_tracing();

    let harness = CallHarness::yielding(0);
    let key = room_key();
    harness.channel.create_room(&key).await.unwrap();
    harness
        .channel
        .write_offer(&key, &SessionDescription::offer("v=0 offer"))
        .await
        .unwrap();

    let bob_answer = SessionDescription::answer("a=bob");
    let carol_answer = SessionDescription::answer("a=carol");
    let (bob, carol) = tokio::join!(
        harness.channel.write_answer(&key, &bob_answer),
        harness.channel.write_answer(&key, &carol_answer),
    );

    let (winner, loser) = match (&bob, &carol) {
        (Ok(()), Err(e)) => (&bob_answer, e),
        (Err(e), Ok(())) => (&carol_answer, e),
        other => panic!("exactly one answer must be accepted, got {other:?}"),
    };
    assert!(matches!(loser, StoreError::Conflict { .. }));

    let room = harness.channel.read_room(&key).await.unwrap().unwrap();
    assert_eq!(room.answer.as_ref(), Some(winner));
    // room creation + offer + one answer
    assert_eq!(harness.store.write_count(&key.document_path()), 3);
}

#[tokio::test]
async fn test_racing_offers_have_one_winner() {
    let harness = CallHarness::yielding(0);
    let key = room_key();
    harness.channel.create_room(&key).await.unwrap();

    let offer1 = SessionDescription::offer("o=1");
    let offer2 = SessionDescription::offer("o=2");
    let (first, second) = tokio::join!(
        harness.channel.write_offer(&key, &offer1),
        harness.channel.write_offer(&key, &offer2),
    );
    assert_eq!(
        [first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count(),
        1
    );
}

#[tokio::test]
async fn test_two_callees_only_one_connects() {
    init_tracing();

    let harness = CallHarness::yielding(1);
    let key = room_key();
    let alice = harness.session();
    let bob = harness.session();
    let carol = harness.session();

    alice.start_call(&key).await.unwrap();
    let (bob_joined, carol_joined) = tokio::join!(bob.join_call(&key), carol.join_call(&key));

    let (winner, loser, error) = match (bob_joined, carol_joined) {
        (Ok(()), Err(e)) => (&bob, &carol, e),
        (Err(e), Ok(())) => (&carol, &bob, e),
        other => panic!("exactly one callee must get in, got {other:?}"),
    };
    assert!(matches!(
        error,
        CallError::Store(StoreError::Conflict { .. })
    ));
    assert_eq!(winner.phase(), CallPhase::Connected);
    assert_eq!(loser.phase(), CallPhase::Closed);

    let connected = tokio::time::timeout(Duration::from_secs(5), alice.connected())
        .await
        .expect("caller never saw the answer");
    assert!(connected);

    // The caller installed the answer of the callee that is still connected.
    let room = harness.channel.read_room(&key).await.unwrap().unwrap();
    let caller_pc = harness.factory.connection(0);
    assert_eq!(caller_pc.remote_description(), room.answer);
    assert_eq!(caller_pc.remote_description_sets(), 1);

    let callees = &harness.factory.created()[1..];
    assert_eq!(callees.iter().filter(|pc| pc.is_closed()).count(), 1);
    let live = callees.iter().find(|pc| !pc.is_closed()).unwrap();
    assert!(room.answer.unwrap().sdp.contains(live.label()));

    alice.hang_up().await;
    winner.hang_up().await;
}
