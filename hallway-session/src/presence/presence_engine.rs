use crate::bus::EventBus;
use crate::config::PresenceConfig;
use crate::presence::input::{Direction, HeldKeys};
use crate::presence::position_store::PositionStore;
use hallway_core::{BusEvent, ParticipantId, Position};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace};

/// Invoked with every committed position, after the bus publish.
pub type MoveCallback = Arc<dyn Fn(Position) + Send + Sync>;

struct EngineState {
    position: Position,
    target: Option<Position>,
    keys: HeldKeys,
    zone: Option<String>,
}

struct EngineInner {
    participant: ParticipantId,
    store: Arc<PositionStore>,
    bus: EventBus,
    on_move: Option<MoveCallback>,
    click_speed: f64,
    arrival_epsilon: f64,
    key_speed: f64,
    frame_interval: Duration,
    key_interval: Duration,
    state: Mutex<EngineState>,
}

/// Turns click and key intents into collision-checked position commits.
///
/// Owns the local participant's position. Every commit is published as
/// `position:updated` on the bus and handed to the optional callback; zone crossings are
/// published as `zone:entered` / `zone:left`.
pub struct PresenceEngine {
    inner: Arc<EngineInner>,
    tickers: Mutex<Vec<JoinHandle<()>>>,
}

enum Commit {
    Rejected,
    Moved {
        position: Position,
        left: Option<String>,
        entered: Option<String>,
    },
}

impl PresenceEngine {
    /// Create an engine at `start`, moved to the nearest valid spot if needed.
    pub fn new(
        participant: ParticipantId,
        store: Arc<PositionStore>,
        bus: EventBus,
        config: &PresenceConfig,
        start: Position,
    ) -> Self {
        let position = store.find_valid_near(start);
        let zone = store.zone_at(position).map(|z| z.id.clone());

        Self {
            inner: Arc::new(EngineInner {
                participant,
                store,
                bus,
                on_move: None,
                click_speed: config.click_speed,
                arrival_epsilon: config.arrival_epsilon,
                key_speed: config.key_speed,
                frame_interval: config.frame_interval(),
                key_interval: config.key_interval(),
                state: Mutex::new(EngineState {
                    position,
                    target: None,
                    keys: HeldKeys::default(),
                    zone,
                }),
            }),
            tickers: Mutex::new(Vec::new()),
        }
    }

    /// Attach the external movement callback. Must be called before [`start`](Self::start).
    pub fn with_callback(mut self, callback: MoveCallback) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.on_move = Some(callback);
        }
        self
    }

    pub fn participant(&self) -> ParticipantId {
        self.inner.participant
    }

    pub fn position(&self) -> Position {
        self.inner.lock().position
    }

    pub fn current_zone(&self) -> Option<String> {
        self.inner.lock().zone.clone()
    }

    pub fn target(&self) -> Option<Position> {
        self.inner.lock().target
    }

    pub fn store(&self) -> &PositionStore {
        &self.inner.store
    }

    /// Start smoothing toward `target`. A target inside an obstacle is pulled to the nearest
    /// valid point first.
    pub fn move_to(&self, target: Position) {
        let resolved = self.inner.store.find_valid_near(target);
        let mut state = self.inner.lock();
        state.target = Some(resolved);
        state.keys.clear();
    }

    pub fn press(&self, dir: Direction) {
        let mut state = self.inner.lock();
        state.keys.press(dir);
        state.target = None;
    }

    pub fn release(&self, dir: Direction) {
        self.inner.lock().keys.release(dir);
    }

    /// Jump to `pos` without smoothing. Returns `false` and stays put if `pos` is invalid.
    pub fn teleport(&self, pos: Position) -> bool {
        self.inner.lock().target = None;
        matches!(self.inner.commit(pos), Commit::Moved { .. })
    }

    /// Jump to the nearest valid position to `pos`.
    pub fn teleport_near(&self, pos: Position) -> Position {
        let resolved = self.inner.store.find_valid_near(pos);
        if !self.teleport(resolved) {
            // Already there; nothing changed.
            trace!("Teleport to ({}, {}) was a no-op", resolved.x, resolved.y);
        }
        self.position()
    }

    /// Advance click-to-move smoothing by one frame.
    pub fn tick_frame(&self) {
        self.inner.tick_frame();
    }

    /// Sample held keys once.
    pub fn tick_keys(&self) {
        self.inner.tick_keys();
    }

    /// Spawn the frame and key tickers on the current runtime.
    pub fn start(&self) {
        let mut tickers = self.lock_tickers();
        if !tickers.is_empty() {
            return;
        }

        let frame = Arc::clone(&self.inner);
        tickers.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(frame.frame_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                frame.tick_frame();
            }
        }));

        let keys = Arc::clone(&self.inner);
        tickers.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(keys.key_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                keys.tick_keys();
            }
        }));

        info!("Presence engine started for {}", self.inner.participant);
    }

    /// Cancel the tickers. Safe to call repeatedly.
    pub fn shutdown(&self) {
        let handles: Vec<_> = self.lock_tickers().drain(..).collect();
        if handles.is_empty() {
            return;
        }
        for handle in handles {
            handle.abort();
        }
        info!("Presence engine stopped for {}", self.inner.participant);
    }

    pub fn running_tickers(&self) -> usize {
        self.lock_tickers().iter().filter(|h| !h.is_finished()).count()
    }

    fn lock_tickers(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tickers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for PresenceEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl EngineInner {
    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn tick_frame(&self) {
        let (current, target) = {
            let state = self.lock();
            match state.target {
                Some(target) => (state.position, target),
                None => return,
            }
        };

        let remaining = current.distance(&target);
        if remaining <= self.arrival_epsilon {
            self.lock().target = None;
            return;
        }

        let next = if remaining <= self.click_speed {
            target
        } else {
            let scale = self.click_speed / remaining;
            current.offset((target.x - current.x) * scale, (target.y - current.y) * scale)
        };

        if let Commit::Moved { position, .. } = self.commit(next) {
            if position.distance(&target) <= self.arrival_epsilon {
                let mut state = self.lock();
                if state.target == Some(target) {
                    state.target = None;
                }
            }
        }
    }

    fn tick_keys(&self) {
        let (current, vector) = {
            let state = self.lock();
            match state.keys.vector() {
                Some(v) => (state.position, v),
                None => return,
            }
        };
        let next = current.offset(vector.0 * self.key_speed, vector.1 * self.key_speed);
        self.commit(next);
    }

    /// Single funnel for every position change. Blocked steps are dropped.
    fn commit(&self, next: Position) -> Commit {
        if !self.store.is_valid(next) {
            trace!("Step to ({:.1}, {:.1}) blocked", next.x, next.y);
            return Commit::Rejected;
        }

        let outcome = {
            let mut state = self.lock();
            if state.position == next {
                return Commit::Rejected;
            }
            state.position = next;

            let zone = self.store.zone_at(next).map(|z| z.id.clone());
            if zone != state.zone {
                let left = state.zone.take();
                state.zone = zone.clone();
                Commit::Moved {
                    position: next,
                    left,
                    entered: zone,
                }
            } else {
                Commit::Moved {
                    position: next,
                    left: None,
                    entered: None,
                }
            }
        };

        if let Commit::Moved {
            position,
            left,
            entered,
        } = &outcome
        {
            self.bus.publish(BusEvent::PositionUpdated {
                participant: self.participant,
                position: *position,
            });
            if let Some(zone_id) = left {
                debug!("{} left zone '{}'", self.participant, zone_id);
                self.bus.publish(BusEvent::ZoneLeft {
                    zone_id: zone_id.clone(),
                });
            }
            if let Some(zone_id) = entered {
                debug!("{} entered zone '{}'", self.participant, zone_id);
                self.bus.publish(BusEvent::ZoneEntered {
                    zone_id: zone_id.clone(),
                });
            }
            if let Some(callback) = &self.on_move {
                callback(*position);
            }
        }

        outcome
    }
}
