pub use hallway_core::model::{ParticipantId, Position, RoomKey};

pub mod model {
    pub use hallway_core::model::*;
}

#[cfg(feature = "session")]
pub mod session {
    pub use hallway_session::*;
}
