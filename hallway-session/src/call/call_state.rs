use hallway_core::CandidateSide;

/// Which end of the call this session plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallRole {
    /// Creates the room and writes the offer. Owns the room document.
    Caller,
    /// Reads the offer and writes the answer.
    Callee,
}

impl CallRole {
    /// The candidate log this side appends to.
    pub fn local_side(self) -> CandidateSide {
        match self {
            CallRole::Caller => CandidateSide::Caller,
            CallRole::Callee => CandidateSide::Callee,
        }
    }
}

/// Coarse lifecycle of a call: `idle -> negotiating -> connected -> closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    Negotiating { role: CallRole },
    Connected,
    Closed,
}

/// The step a session is currently on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    Idle,

    // caller
    CreateRoom,
    GenerateOffer,
    WriteOffer,
    WaitForAnswer,
    ApplyAnswer,

    // callee
    ReadOffer,
    ApplyOffer,
    GenerateAnswer,
    WriteAnswer,

    Connected,
    Closed,
}

impl CallPhase {
    pub fn state(self) -> CallState {
        match self {
            CallPhase::Idle => CallState::Idle,
            CallPhase::CreateRoom
            | CallPhase::GenerateOffer
            | CallPhase::WriteOffer
            | CallPhase::WaitForAnswer
            | CallPhase::ApplyAnswer => CallState::Negotiating {
                role: CallRole::Caller,
            },
            CallPhase::ReadOffer
            | CallPhase::ApplyOffer
            | CallPhase::GenerateAnswer
            | CallPhase::WriteAnswer => CallState::Negotiating {
                role: CallRole::Callee,
            },
            CallPhase::Connected => CallState::Connected,
            CallPhase::Closed => CallState::Closed,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == CallPhase::Closed
    }
}
