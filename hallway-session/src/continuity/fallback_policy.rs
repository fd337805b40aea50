use crate::config::ContinuityConfig;
use crate::continuity::snapshot_store::SnapshotStore;
use hallway_core::{ParticipantId, SessionSnapshot};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One snapshot tier and how long its reads and writes may take.
pub struct SnapshotTier {
    pub store: Arc<dyn SnapshotStore>,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

/// Ordered snapshot tiers.
///
/// Reads try each tier in order and stop at the first snapshot found; an error, a timeout or
/// an empty result moves on to the next tier. Writes go to every tier concurrently, each
/// bounded by its write timeout, so a failing or hung tier never holds up the others or
/// the caller.
#[derive(Default)]
pub struct FallbackPolicy {
    tiers: Vec<SnapshotTier>,
}

impl FallbackPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Realtime first with the short timeout, durable second.
    pub fn standard(
        realtime: Arc<dyn SnapshotStore>,
        durable: Arc<dyn SnapshotStore>,
        config: &ContinuityConfig,
    ) -> Self {
        Self::new()
            .with_tier(realtime, config.fast_read_timeout(), config.write_timeout())
            .with_tier(durable, config.durable_read_timeout(), config.write_timeout())
    }

    pub fn with_tier(
        mut self,
        store: Arc<dyn SnapshotStore>,
        read_timeout: Duration,
        write_timeout: Duration,
    ) -> Self {
        self.tiers.push(SnapshotTier {
            store,
            read_timeout,
            write_timeout,
        });
        self
    }

    pub fn tier_names(&self) -> Vec<&'static str> {
        self.tiers.iter().map(|t| t.store.name()).collect()
    }

    /// First snapshot found, in tier order. Timestamps are not compared across tiers; an
    /// answer from an earlier tier wins even if a later one holds a newer write.
    pub async fn load(&self, participant: ParticipantId) -> Option<SessionSnapshot> {
        for tier in &self.tiers {
            let name = tier.store.name();
            match tokio::time::timeout(tier.read_timeout, tier.store.load(participant)).await {
                Ok(Ok(Some(snapshot))) => {
                    info!("Loaded snapshot for {} from {} store", participant, name);
                    return Some(snapshot);
                }
                Ok(Ok(None)) => debug!("No snapshot for {} in {} store", participant, name),
                Ok(Err(e)) => warn!("Reading {} store failed: {}", name, e),
                Err(_) => warn!(
                    "Reading {} store timed out after {:?}",
                    name, tier.read_timeout
                ),
            }
        }
        None
    }

    /// Write to every tier. Returns how many accepted the snapshot in time.
    pub async fn save_all(&self, participant: ParticipantId, snapshot: &SessionSnapshot) -> usize {
        let writes = self.tiers.iter().map(|tier| async move {
            let write = tier.store.save(participant, snapshot);
            (tier, tokio::time::timeout(tier.write_timeout, write).await)
        });

        let mut saved = 0;
        for (tier, result) in futures::future::join_all(writes).await {
            let name = tier.store.name();
            match result {
                Ok(Ok(())) => saved += 1,
                Ok(Err(e)) => warn!("Writing snapshot to {} store failed: {}", name, e),
                Err(_) => warn!(
                    "Writing snapshot to {} store timed out after {:?}",
                    name, tier.write_timeout
                ),
            }
        }
        saved
    }
}
