use crate::transport::media::TrackKind;
use hallway_core::IceCandidate;

/// Connection state reported by the ICE/peer-connection primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl LinkState {
    /// The link is down and will not come back without a new negotiation.
    pub fn is_lost(self) -> bool {
        matches!(
            self,
            LinkState::Disconnected | LinkState::Failed | LinkState::Closed
        )
    }
}

/// Events a peer connection pushes to the session that owns it.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A local ICE candidate was gathered; it must reach the remote side via signaling.
    CandidateGenerated(IceCandidate),

    StateChanged(LinkState),

    /// The remote side started sending a track.
    RemoteTrack { kind: TrackKind, id: String },
}
