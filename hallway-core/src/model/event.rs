use crate::model::geometry::Position;
use crate::model::participant::ParticipantId;
use crate::model::snapshot::SessionSnapshot;
use serde::{Deserialize, Serialize};

/// Events carried by the in-process event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum BusEvent {
    #[serde(rename = "room:joined")]
    RoomJoined { room_id: String },

    #[serde(rename = "position:updated")]
    PositionUpdated {
        participant: ParticipantId,
        position: Position,
    },

    #[serde(rename = "character:selected")]
    CharacterSelected { avatar: String },

    #[serde(rename = "zone:entered")]
    ZoneEntered { zone_id: String },

    #[serde(rename = "zone:left")]
    ZoneLeft { zone_id: String },

    #[serde(rename = "session:restored")]
    SessionRestored { snapshot: SessionSnapshot },
}

impl BusEvent {
    pub fn name(&self) -> &'static str {
        match self {
            BusEvent::RoomJoined { .. } => "room:joined",
            BusEvent::PositionUpdated { .. } => "position:updated",
            BusEvent::CharacterSelected { .. } => "character:selected",
            BusEvent::ZoneEntered { .. } => "zone:entered",
            BusEvent::ZoneLeft { .. } => "zone:left",
            BusEvent::SessionRestored { .. } => "session:restored",
        }
    }
}
