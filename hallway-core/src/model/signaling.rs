use crate::model::room::RoomKey;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

/// One trickled ICE candidate as stored in a candidate log.
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default)]
    pub sdp_m_line_index: Option<u16>,
}

/// Which of the two candidate logs of a room an entry belongs to.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum CandidateSide {
    Caller,
    Callee,
}

impl CandidateSide {
    pub fn opposite(self) -> Self {
        match self {
            CandidateSide::Caller => CandidateSide::Callee,
            CandidateSide::Callee => CandidateSide::Caller,
        }
    }

    pub fn collection_name(self) -> &'static str {
        match self {
            CandidateSide::Caller => "callerCandidates",
            CandidateSide::Callee => "calleeCandidates",
        }
    }

    pub fn collection_path(self, room: &RoomKey) -> String {
        format!("{}/{}", room.document_path(), self.collection_name())
    }
}
