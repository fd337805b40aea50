use crate::bus::EventBus;
use dashmap::DashMap;
use hallway_core::{BusEvent, ParticipantId, Position};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Read-only mirror of other participants' positions, fed from `position:updated`.
pub struct PresenceRoster {
    local: ParticipantId,
    peers: Arc<DashMap<ParticipantId, Position>>,
    task: JoinHandle<()>,
}

impl PresenceRoster {
    /// Subscribe to `bus` and start mirroring every participant except `local`.
    pub fn spawn(local: ParticipantId, bus: &EventBus) -> Self {
        let peers = Arc::new(DashMap::new());
        let mut sub = bus.subscribe();
        let mirror = Arc::clone(&peers);

        let task = tokio::spawn(async move {
            while let Some(event) = sub.recv().await {
                if let BusEvent::PositionUpdated {
                    participant,
                    position,
                } = event
                {
                    if participant == local {
                        continue;
                    }
                    if mirror.insert(participant, position).is_none() {
                        debug!("Roster sees new participant {}", participant);
                    }
                }
            }
        });

        Self { local, peers, task }
    }

    pub fn local(&self) -> ParticipantId {
        self.local
    }

    pub fn position_of(&self, participant: &ParticipantId) -> Option<Position> {
        self.peers.get(participant).map(|entry| *entry.value())
    }

    pub fn participants(&self) -> Vec<ParticipantId> {
        self.peers.iter().map(|entry| *entry.key()).collect()
    }

    /// Drop a participant that left the space.
    pub fn forget(&self, participant: &ParticipantId) {
        self.peers.remove(participant);
    }
}

impl Drop for PresenceRoster {
    fn drop(&mut self) {
        self.task.abort();
    }
}
