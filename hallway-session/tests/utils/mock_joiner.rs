use async_trait::async_trait;
use hallway_core::BusEvent;
use hallway_session::{EventBus, RestoreError, RoomJoiner};
use std::sync::Mutex;

/// Records joins and announces them on the bus, or fails every join.
pub struct MockRoomJoiner {
    bus: EventBus,
    fail: bool,
    joined: Mutex<Vec<String>>,
}

impl MockRoomJoiner {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            fail: false,
            joined: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(bus: EventBus) -> Self {
        Self {
            fail: true,
            ..Self::new(bus)
        }
    }

    pub fn joined(&self) -> Vec<String> {
        self.joined.lock().unwrap().clone()
    }
}

#[async_trait]
impl RoomJoiner for MockRoomJoiner {
    async fn join_room(&self, room_id: &str) -> Result<(), RestoreError> {
        if self.fail {
            return Err(RestoreError::JoinFailed {
                room_id: room_id.to_string(),
                reason: "room service unreachable".into(),
            });
        }
        self.joined.lock().unwrap().push(room_id.to_string());
        self.bus.publish(BusEvent::RoomJoined {
            room_id: room_id.to_string(),
        });
        Ok(())
    }
}
