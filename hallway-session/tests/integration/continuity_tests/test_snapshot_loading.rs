use std::time::Duration;

use hallway_core::{Position, SessionSnapshot};
use hallway_session::DocumentStore;

use super::ContinuityHarness;
use crate::integration::init_tracing;

async fn write_snapshot(harness: &ContinuityHarness, room: &str) {
    harness.continuity.track_room(room);
    harness.continuity.track_position(Position::new(300.0, 200.0));
    harness.continuity.start();
    tokio::time::sleep(Duration::from_millis(10)).await;
    harness.continuity.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_load_prefers_realtime() {
    init_tracing();

    let before = ContinuityHarness::new();
    write_snapshot(&before, "room1").await;

    let after = ContinuityHarness::reload(
        before.participant,
        before.realtime.clone(),
        before.durable.clone(),
    );
    let snapshot = after.continuity.load_latest().await.unwrap();
    assert_eq!(snapshot.room_id, "room1");
    assert_eq!(snapshot.position, Position::new(300.0, 200.0));
}

#[tokio::test(start_paused = true)]
async fn test_load_falls_back_when_realtime_is_down_or_slow() {
    init_tracing();

    let before = ContinuityHarness::new();
    write_snapshot(&before, "room1").await;

    before.realtime.set_available(false);
    let offline = ContinuityHarness::reload(
        before.participant,
        before.realtime.clone(),
        before.durable.clone(),
    );
    assert_eq!(
        offline.continuity.load_latest().await.map(|s| s.room_id),
        Some("room1".to_string())
    );

    before.realtime.set_available(true);
    before.realtime.set_read_delay(Duration::from_secs(30));
    let slow = ContinuityHarness::reload(
        before.participant,
        before.realtime.clone(),
        before.durable.clone(),
    );
    let started = tokio::time::Instant::now();
    assert!(slow.continuity.load_latest().await.is_some());
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_load_is_cached_for_the_process() {
    let before = ContinuityHarness::new();
    write_snapshot(&before, "room1").await;

    let after = ContinuityHarness::reload(
        before.participant,
        before.realtime.clone(),
        before.durable.clone(),
    );
    assert_eq!(
        after.continuity.load_latest().await.map(|s| s.room_id),
        Some("room1".to_string())
    );

    // A newer snapshot from elsewhere is not picked up by this process.
    let newer = SessionSnapshot {
        room_id: "room2".into(),
        position: Position::new(50.0, 50.0),
        avatar: None,
        last_zone_id: None,
        timestamp: u64::MAX,
    };
    before.realtime.set_available(false);
    before
        .durable
        .set(&after.path(), serde_json::to_value(&newer).unwrap())
        .await
        .unwrap();
    assert_eq!(
        after.continuity.load_latest().await.map(|s| s.room_id),
        Some("room1".to_string())
    );
}

#[tokio::test]
async fn test_nothing_stored_loads_none() {
    let harness = ContinuityHarness::new();
    assert!(harness.continuity.load_latest().await.is_none());
}
