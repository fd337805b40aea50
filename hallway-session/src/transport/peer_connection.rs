use crate::transport::media::MediaTrack;
use crate::transport::transport_event::TransportEvent;
use anyhow::Result;
use async_trait::async_trait;
use hallway_core::{IceCandidate, SessionDescription};
use std::sync::Arc;
use tokio::sync::mpsc;

/// The ICE/peer-connection primitive a [`PeerSession`](crate::PeerSession) drives.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn add_track(&self, track: &MediaTrack) -> Result<()>;

    /// Generate an offer and install it as the local description.
    async fn create_offer(&self) -> Result<SessionDescription>;

    /// Generate an answer to the applied remote offer and install it locally.
    async fn create_answer(&self) -> Result<SessionDescription>;

    async fn set_remote_description(&self, desc: &SessionDescription) -> Result<()>;

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Creates peer connections that report through the given event channel.
#[async_trait]
pub trait PeerConnectionFactory: Send + Sync {
    async fn create(
        &self,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Arc<dyn PeerConnection>>;
}
