use crate::bus::{BusSubscription, EventBus};
use crate::config::ContinuityConfig;
use crate::continuity::fallback_policy::FallbackPolicy;
use crate::error::RestoreError;
use crate::presence::PresenceEngine;
use async_trait::async_trait;
use hallway_core::{BusEvent, ParticipantId, Position, SessionSnapshot};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{OnceCell, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

/// Result of replaying a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum RestoreOutcome {
    /// The session was replayed; `position` is where the avatar landed.
    Restored { position: Position },
    /// Replay failed and the session starts over. `notice` is meant for the user.
    Fresh { notice: String },
}

/// Joins a room on behalf of [`SessionContinuity::restore`].
#[async_trait]
pub trait RoomJoiner: Send + Sync {
    async fn join_room(&self, room_id: &str) -> Result<(), RestoreError>;
}

/// Announces the join as `room:joined` and nothing else.
pub struct BusRoomJoiner {
    bus: EventBus,
}

impl BusRoomJoiner {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl RoomJoiner for BusRoomJoiner {
    async fn join_room(&self, room_id: &str) -> Result<(), RestoreError> {
        self.bus.publish(BusEvent::RoomJoined {
            room_id: room_id.to_string(),
        });
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
struct TrackedSession {
    room_id: Option<String>,
    position: Option<Position>,
    avatar: Option<String>,
    last_zone_id: Option<String>,
}

impl TrackedSession {
    fn snapshot(&self, timestamp: u64) -> Option<SessionSnapshot> {
        Some(SessionSnapshot {
            room_id: self.room_id.clone()?,
            position: self.position?,
            avatar: self.avatar.clone(),
            last_zone_id: self.last_zone_id.clone(),
            timestamp,
        })
    }
}

struct ContinuityInner {
    participant: ParticipantId,
    policy: FallbackPolicy,
    config: ContinuityConfig,
    tracked: Mutex<TrackedSession>,
}

impl ContinuityInner {
    fn lock(&self) -> MutexGuard<'_, TrackedSession> {
        self.tracked.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn write(&self, reason: &str) {
        let snapshot = self.lock().snapshot(unix_millis());
        let Some(snapshot) = snapshot else {
            trace!("Skipping {} snapshot, no room joined yet", reason);
            return;
        };
        let saved = self.policy.save_all(self.participant, &snapshot).await;
        debug!("Snapshot ({}) accepted by {} stores", reason, saved);
    }

    /// Fold a bus event into the tracked state. Returns true for a local position change.
    fn observe(&self, event: &BusEvent) -> bool {
        let mut tracked = self.lock();
        match event {
            BusEvent::RoomJoined { room_id } => tracked.room_id = Some(room_id.clone()),
            BusEvent::PositionUpdated {
                participant,
                position,
            } if *participant == self.participant => {
                tracked.position = Some(*position);
                return true;
            }
            BusEvent::CharacterSelected { avatar } => tracked.avatar = Some(avatar.clone()),
            BusEvent::ZoneEntered { zone_id } => tracked.last_zone_id = Some(zone_id.clone()),
            _ => {}
        }
        false
    }
}

struct Writer {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Persists the latest session summary and replays it after a reload.
///
/// Writes go to every tier of the [`FallbackPolicy`] on a fixed interval (first tick at
/// start), when a room is joined, when the local avatar has stopped moving for the settle
/// debounce, and once more at [`shutdown`](Self::shutdown). Nothing is written before a
/// room is known.
pub struct SessionContinuity {
    inner: Arc<ContinuityInner>,
    bus: EventBus,
    loaded: OnceCell<Option<SessionSnapshot>>,
    writer: Mutex<Option<Writer>>,
}

impl SessionContinuity {
    pub fn new(
        participant: ParticipantId,
        bus: EventBus,
        policy: FallbackPolicy,
        config: ContinuityConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ContinuityInner {
                participant,
                policy,
                config,
                tracked: Mutex::new(TrackedSession::default()),
            }),
            bus,
            loaded: OnceCell::new(),
            writer: Mutex::new(None),
        }
    }

    pub fn participant(&self) -> ParticipantId {
        self.inner.participant
    }

    /// Record the current room without triggering a write.
    pub fn track_room(&self, room_id: impl Into<String>) {
        self.inner.lock().room_id = Some(room_id.into());
    }

    /// Record the current position without triggering a write.
    pub fn track_position(&self, position: Position) {
        self.inner.lock().position = Some(position);
    }

    /// The snapshot that would be written right now.
    pub fn current_snapshot(&self) -> Option<SessionSnapshot> {
        self.inner.lock().snapshot(unix_millis())
    }

    /// Subscribe to the bus and spawn the writer. Calling it again is a no-op.
    pub fn start(&self) {
        let mut writer = self.lock_writer();
        if writer.is_some() {
            return;
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run_writer(
            Arc::clone(&self.inner),
            self.bus.subscribe(),
            shutdown_rx,
        ));
        *writer = Some(Writer {
            shutdown: shutdown_tx,
            task,
        });
        info!("Session continuity started for {}", self.inner.participant);
    }

    /// Final write, then stop the writer. Safe to call repeatedly.
    pub async fn shutdown(&self) {
        let Some(writer) = self.lock_writer().take() else {
            return;
        };
        let _ = writer.shutdown.send(());
        if let Err(e) = writer.task.await {
            if !e.is_cancelled() {
                error!("Snapshot writer failed: {}", e);
            }
        }
        info!("Session continuity stopped for {}", self.inner.participant);
    }

    /// Latest snapshot from the first tier that has one. Read once per process; later calls
    /// return the cached result.
    pub async fn load_latest(&self) -> Option<SessionSnapshot> {
        self.loaded
            .get_or_init(|| async { self.inner.policy.load(self.inner.participant).await })
            .await
            .clone()
    }

    /// Replay `snapshot` into the presence engine.
    ///
    /// Joins the room, waits for the join to settle, moves the avatar, republishes the
    /// avatar choice and, after a longer pause, the last zone if the avatar is inside it and
    /// the teleport has not announced it already. A stored position that is no longer valid
    /// lands on the nearest valid spot instead. On any failure the tracked state
    /// is reset and [`RestoreOutcome::Fresh`] is returned.
    pub async fn restore(
        &self,
        snapshot: &SessionSnapshot,
        engine: &PresenceEngine,
        joiner: &dyn RoomJoiner,
    ) -> RestoreOutcome {
        match self.replay(snapshot, engine, joiner).await {
            Ok(position) => {
                info!(
                    "Restored session in room {} at ({}, {})",
                    snapshot.room_id, position.x, position.y
                );
                RestoreOutcome::Restored { position }
            }
            Err(e) => {
                error!("Session restore failed: {}", e);
                *self.inner.lock() = TrackedSession::default();
                RestoreOutcome::Fresh {
                    notice: format!(
                        "Your previous session could not be restored ({e}). Starting fresh."
                    ),
                }
            }
        }
    }

    async fn replay(
        &self,
        snapshot: &SessionSnapshot,
        engine: &PresenceEngine,
        joiner: &dyn RoomJoiner,
    ) -> Result<Position, RestoreError> {
        if !snapshot.position.is_finite() {
            return Err(RestoreError::InvalidPosition(snapshot.position));
        }

        joiner.join_room(&snapshot.room_id).await?;
        self.track_room(snapshot.room_id.clone());
        tokio::time::sleep(self.inner.config.join_settle()).await;

        let position = if engine.store().is_valid(snapshot.position) {
            engine.teleport(snapshot.position);
            snapshot.position
        } else {
            warn!(
                "Stored position ({}, {}) is no longer valid",
                snapshot.position.x, snapshot.position.y
            );
            engine.teleport_near(snapshot.position)
        };
        self.track_position(position);

        if let Some(avatar) = &snapshot.avatar {
            self.bus.publish(BusEvent::CharacterSelected {
                avatar: avatar.clone(),
            });
        }

        tokio::time::sleep(self.inner.config.zone_settle()).await;
        let current_zone = engine.current_zone();
        let landed_zone = engine.store().zone_at(position).map(|z| z.id.clone());
        match &snapshot.last_zone_id {
            Some(zone_id) if current_zone.as_ref() == Some(zone_id) => {
                trace!("Zone '{}' already announced by the teleport", zone_id);
            }
            Some(zone_id) if landed_zone.as_ref() == Some(zone_id) => {
                self.bus.publish(BusEvent::ZoneEntered {
                    zone_id: zone_id.clone(),
                });
            }
            Some(zone_id) => debug!("Landed outside stored zone '{}'", zone_id),
            None => {}
        }
        self.inner.lock().last_zone_id = engine.current_zone();

        self.bus.publish(BusEvent::SessionRestored {
            snapshot: snapshot.clone(),
        });
        Ok(position)
    }

    fn lock_writer(&self) -> MutexGuard<'_, Option<Writer>> {
        self.writer.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for SessionContinuity {
    fn drop(&mut self) {
        if let Some(writer) = self.lock_writer().take() {
            writer.task.abort();
        }
    }
}

async fn run_writer(
    inner: Arc<ContinuityInner>,
    mut events: BusSubscription,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut interval = tokio::time::interval(inner.config.snapshot_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let debounce = inner.config.settle_debounce();
    let mut settle_at: Option<Instant> = None;

    loop {
        let settle = tokio::time::sleep_until(settle_at.unwrap_or_else(Instant::now));

        tokio::select! {
            _ = &mut shutdown => {
                inner.write("teardown").await;
                break;
            }

            _ = interval.tick() => inner.write("interval").await,

            _ = settle, if settle_at.is_some() => {
                settle_at = None;
                inner.write("position settled").await;
            }

            event = events.recv() => {
                let Some(event) = event else {
                    debug!("Event bus closed, snapshot writer exiting");
                    break;
                };
                let moved = inner.observe(&event);
                if moved {
                    settle_at = Some(Instant::now() + debounce);
                } else if matches!(event, BusEvent::RoomJoined { .. }) {
                    inner.write("room joined").await;
                }
            }
        }
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
