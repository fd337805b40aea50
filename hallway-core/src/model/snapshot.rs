use crate::model::geometry::Position;
use serde::{Deserialize, Serialize};

/// Latest persisted summary of a participant's session, used to resume after reload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub room_id: String,
    pub position: Position,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default)]
    pub last_zone_id: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}
