mod event;
mod geometry;
mod participant;
mod room;
mod signaling;
mod snapshot;

pub use event::BusEvent;
pub use geometry::{Position, Rect, Zone};
pub use participant::ParticipantId;
pub use room::{RoomDocument, RoomKey, SdpType, SessionDescription};
pub use signaling::{CandidateSide, IceCandidate, IceServerConfig};
pub use snapshot::SessionSnapshot;
