use serde::{Deserialize, Serialize};
use std::fmt;

/// Address of a call room inside a space.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomKey {
    pub space_id: String,
    pub room_id: String,
}

impl RoomKey {
    pub fn new(space_id: impl Into<String>, room_id: impl Into<String>) -> Self {
        Self {
            space_id: space_id.into(),
            room_id: room_id.into(),
        }
    }

    /// Path of the room document in the remote document store.
    pub fn document_path(&self) -> String {
        format!("spaces/{}/rooms/{}", self.space_id, self.room_id)
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.space_id, self.room_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

/// SDP blob exchanged through the room document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// The room record. Holds at most one offer and one answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer: Option<SessionDescription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<SessionDescription>,
}

impl RoomDocument {
    pub fn is_complete(&self) -> bool {
        self.offer.is_some() && self.answer.is_some()
    }
}
