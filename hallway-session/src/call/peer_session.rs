use crate::call::call_state::{CallPhase, CallRole, CallState};
use crate::error::CallError;
use crate::signaling::{CandidateEntry, RoomChange, SignalingChannel};
use crate::transport::{
    LinkState, LocalMedia, MediaConstraints, MediaDevices, PeerConnection, PeerConnectionFactory,
    TrackKind, TransportEvent,
};
use futures::StreamExt;
use hallway_core::{CandidateSide, IceCandidate, RoomKey, SessionDescription};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

const TRANSPORT_EVENT_CAPACITY: usize = 256;

/// Remote candidates seen so far. Entries that arrive before the remote description is
/// installed wait in `pending`.
#[derive(Default)]
struct RemoteCandidates {
    description_set: bool,
    pending: Vec<IceCandidate>,
    seen_ids: HashSet<String>,
    applied: HashSet<IceCandidate>,
}

#[derive(Default)]
struct CallResources {
    role: Option<CallRole>,
    key: Option<RoomKey>,
    owns_room: bool,
    media: Option<LocalMedia>,
    connection: Option<Arc<dyn PeerConnection>>,
}

struct SessionShared {
    phase: watch::Sender<CallPhase>,
    link: watch::Sender<LinkState>,
    resources: Mutex<CallResources>,
    remote: tokio::sync::Mutex<RemoteCandidates>,
    applied: AtomicUsize,
    answer_applied: AtomicBool,
}

impl SessionShared {
    fn lock_resources(&self) -> MutexGuard<'_, CallResources> {
        self.resources.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Closed is terminal; later transitions are ignored.
    fn set_phase(&self, next: CallPhase) {
        self.phase.send_if_modified(|current| {
            if current.is_terminal() || *current == next {
                return false;
            }
            debug!("Call phase {:?} -> {:?}", current, next);
            *current = next;
            true
        });
    }

    async fn accept_candidate(&self, pc: &dyn PeerConnection, entry: CandidateEntry) {
        let mut remote = self.remote.lock().await;
        if !remote.seen_ids.insert(entry.id.clone()) {
            trace!("Candidate entry {} already seen", entry.id);
            return;
        }
        if !remote.description_set {
            debug!("Buffering candidate {} until the remote description is set", entry.id);
            remote.pending.push(entry.candidate);
            return;
        }
        self.apply_candidate(&mut remote, pc, entry.candidate).await;
    }

    async fn apply_candidate(
        &self,
        remote: &mut RemoteCandidates,
        pc: &dyn PeerConnection,
        candidate: IceCandidate,
    ) {
        if remote.applied.contains(&candidate) {
            trace!("Candidate already applied: {}", candidate.candidate);
            return;
        }
        match pc.add_ice_candidate(&candidate).await {
            Ok(()) => {
                remote.applied.insert(candidate);
                self.applied.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => warn!("Failed to add ICE candidate: {:#}", e),
        }
    }

    /// Install the remote description, then flush buffered candidates in arrival order.
    async fn apply_remote_description(
        &self,
        pc: &dyn PeerConnection,
        desc: &SessionDescription,
    ) -> anyhow::Result<()> {
        let mut remote = self.remote.lock().await;
        pc.set_remote_description(desc).await?;
        remote.description_set = true;

        let pending = std::mem::take(&mut remote.pending);
        if !pending.is_empty() {
            debug!("Flushing {} buffered candidates", pending.len());
        }
        for candidate in pending {
            self.apply_candidate(&mut remote, pc, candidate).await;
        }
        Ok(())
    }

    /// Stop media and close the connection. Room ownership is left to hang-up.
    async fn release_local(&self) {
        let (media, connection) = {
            let mut resources = self.lock_resources();
            (resources.media.take(), resources.connection.take())
        };
        if let Some(media) = media {
            media.stop_all();
        }
        if let Some(connection) = connection {
            if let Err(e) = connection.close().await {
                warn!("Failed to close peer connection: {:#}", e);
            }
        }
    }
}

/// One call, from media acquisition to hang-up.
///
/// A session is single-use: it either starts a call ([`start_call`](Self::start_call)) or
/// joins one ([`join_call`](Self::join_call)), and once closed it stays closed. It owns the
/// local media stream and the peer connection, and runs three background tasks while the
/// call is up: the transport event pump, the remote candidate subscription and the room
/// subscription.
pub struct PeerSession {
    channel: SignalingChannel,
    factory: Arc<dyn PeerConnectionFactory>,
    devices: Arc<dyn MediaDevices>,
    constraints: MediaConstraints,
    started: AtomicBool,
    shared: Arc<SessionShared>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl PeerSession {
    pub fn new(
        channel: SignalingChannel,
        factory: Arc<dyn PeerConnectionFactory>,
        devices: Arc<dyn MediaDevices>,
        constraints: MediaConstraints,
    ) -> Self {
        let (phase, _) = watch::channel(CallPhase::Idle);
        let (link, _) = watch::channel(LinkState::New);

        Self {
            channel,
            factory,
            devices,
            constraints,
            started: AtomicBool::new(false),
            shared: Arc::new(SessionShared {
                phase,
                link,
                resources: Mutex::new(CallResources::default()),
                remote: tokio::sync::Mutex::new(RemoteCandidates::default()),
                applied: AtomicUsize::new(0),
                answer_applied: AtomicBool::new(false),
            }),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn phase(&self) -> CallPhase {
        *self.shared.phase.borrow()
    }

    pub fn state(&self) -> CallState {
        self.phase().state()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<CallPhase> {
        self.shared.phase.subscribe()
    }

    pub fn link_state(&self) -> LinkState {
        *self.shared.link.borrow()
    }

    pub fn subscribe_link(&self) -> watch::Receiver<LinkState> {
        self.shared.link.subscribe()
    }

    pub fn role(&self) -> Option<CallRole> {
        self.shared.lock_resources().role
    }

    pub fn room(&self) -> Option<RoomKey> {
        self.shared.lock_resources().key.clone()
    }

    pub fn local_media(&self) -> Option<LocalMedia> {
        self.shared.lock_resources().media.clone()
    }

    /// Distinct remote candidates handed to the peer connection.
    pub fn applied_candidates(&self) -> usize {
        self.shared.applied.load(Ordering::SeqCst)
    }

    /// Mute or unmute the microphone without releasing it.
    pub fn set_audio_enabled(&self, enabled: bool) {
        if let Some(media) = self.shared.lock_resources().media.as_ref() {
            media.set_enabled(TrackKind::Audio, enabled);
        }
    }

    pub fn set_video_enabled(&self, enabled: bool) {
        if let Some(media) = self.shared.lock_resources().media.as_ref() {
            media.set_enabled(TrackKind::Video, enabled);
        }
    }

    /// Resolve once the call is connected (`true`) or closed (`false`).
    pub async fn connected(&self) -> bool {
        let mut phase = self.subscribe_phase();
        match phase
            .wait_for(|p| matches!(p, CallPhase::Connected | CallPhase::Closed))
            .await
        {
            Ok(reached) => *reached == CallPhase::Connected,
            Err(_) => false,
        }
    }

    /// Caller side: create the room, publish an offer and wait for the answer in the
    /// background.
    ///
    /// Returns once the offer is written; [`connected`](Self::connected) resolves when the
    /// answer has been applied. Media is acquired before anything is written.
    pub async fn start_call(&self, key: &RoomKey) -> Result<(), CallError> {
        self.claim(CallRole::Caller, key)?;
        let media = self.acquire_media().await?;

        info!("Starting call in room {}", key);
        if let Err(e) = self.setup_caller(key, media).await {
            error!("Call setup in {} failed: {}", key, e);
            self.hang_up().await;
            return Err(e);
        }
        Ok(())
    }

    /// Callee side: answer the offer stored in `key`.
    pub async fn join_call(&self, key: &RoomKey) -> Result<(), CallError> {
        self.claim(CallRole::Callee, key)?;
        let media = self.acquire_media().await?;

        info!("Joining call in room {}", key);
        if let Err(e) = self.setup_callee(key, media).await {
            error!("Joining {} failed: {}", key, e);
            self.hang_up().await;
            return Err(e);
        }
        Ok(())
    }

    /// Stop media, close the connection and cancel every subscription.
    ///
    /// The caller also removes the room and both candidate logs. Safe to call repeatedly and
    /// on a session that never connected.
    pub async fn hang_up(&self) {
        let handles: Vec<_> = self.lock_tasks().drain(..).collect();
        for handle in &handles {
            handle.abort();
        }
        for handle in handles {
            let _ = handle.await;
        }

        self.shared.release_local().await;

        let owned_room = {
            let mut resources = self.shared.lock_resources();
            if std::mem::take(&mut resources.owns_room) {
                resources.key.clone()
            } else {
                None
            }
        };
        if let Some(key) = owned_room {
            if let Err(e) = self.channel.delete_room(&key).await {
                warn!("Failed to remove room {}: {}", key, e);
            }
        }

        if !self.phase().is_terminal() {
            info!("Call hung up");
        }
        self.shared.set_phase(CallPhase::Closed);
    }

    fn claim(&self, role: CallRole, key: &RoomKey) -> Result<(), CallError> {
        if self.started.swap(true, Ordering::SeqCst) || self.phase().is_terminal() {
            return Err(CallError::AlreadyStarted);
        }
        let mut resources = self.shared.lock_resources();
        resources.role = Some(role);
        resources.key = Some(key.clone());
        Ok(())
    }

    async fn acquire_media(&self) -> Result<LocalMedia, CallError> {
        match self.devices.get_user_media(self.constraints).await {
            Ok(media) => {
                self.shared.lock_resources().media = Some(media.clone());
                Ok(media)
            }
            Err(e) => {
                warn!("Media acquisition failed: {}", e);
                self.shared.set_phase(CallPhase::Closed);
                Err(e.into())
            }
        }
    }

    async fn setup_caller(&self, key: &RoomKey, media: LocalMedia) -> Result<(), CallError> {
        self.shared.set_phase(CallPhase::CreateRoom);
        self.channel.create_room(key).await?;
        self.shared.lock_resources().owns_room = true;

        let pc = self.open_connection(key, CandidateSide::Caller).await?;
        for track in media.tracks() {
            pc.add_track(track).await?;
        }
        self.watch_remote_candidates(key, CandidateSide::Callee, Arc::clone(&pc))
            .await?;

        self.shared.set_phase(CallPhase::GenerateOffer);
        let offer = pc.create_offer().await?;

        self.shared.set_phase(CallPhase::WriteOffer);
        self.channel.write_offer(key, &offer).await?;

        self.shared.set_phase(CallPhase::WaitForAnswer);
        self.watch_room(key, CallRole::Caller, pc).await?;
        Ok(())
    }

    async fn setup_callee(&self, key: &RoomKey, media: LocalMedia) -> Result<(), CallError> {
        self.shared.set_phase(CallPhase::ReadOffer);
        let offer = self
            .channel
            .read_room(key)
            .await?
            .and_then(|room| room.offer)
            .ok_or_else(|| CallError::SignalingNotFound(key.clone()))?;

        let pc = self.open_connection(key, CandidateSide::Callee).await?;
        for track in media.tracks() {
            pc.add_track(track).await?;
        }
        self.watch_remote_candidates(key, CandidateSide::Caller, Arc::clone(&pc))
            .await?;

        self.shared.set_phase(CallPhase::ApplyOffer);
        self.shared
            .apply_remote_description(pc.as_ref(), &offer)
            .await?;

        self.shared.set_phase(CallPhase::GenerateAnswer);
        let answer = pc.create_answer().await?;

        self.shared.set_phase(CallPhase::WriteAnswer);
        self.channel.write_answer(key, &answer).await?;

        self.watch_room(key, CallRole::Callee, pc).await?;
        self.shared.set_phase(CallPhase::Connected);
        info!("Joined call in room {}", key);
        Ok(())
    }

    async fn open_connection(
        &self,
        key: &RoomKey,
        side: CandidateSide,
    ) -> Result<Arc<dyn PeerConnection>, CallError> {
        let (events_tx, events_rx) = mpsc::channel(TRANSPORT_EVENT_CAPACITY);
        let pc = self.factory.create(events_tx).await?;
        self.shared.lock_resources().connection = Some(Arc::clone(&pc));

        let pump = tokio::spawn(pump_transport_events(
            events_rx,
            self.channel.clone(),
            key.clone(),
            side,
            Arc::clone(&self.shared),
        ));
        self.lock_tasks().push(pump);
        Ok(pc)
    }

    async fn watch_remote_candidates(
        &self,
        key: &RoomKey,
        side: CandidateSide,
        pc: Arc<dyn PeerConnection>,
    ) -> Result<(), CallError> {
        let mut candidates = self.channel.watch_candidates(key, side).await?;
        let shared = Arc::clone(&self.shared);
        let key = key.clone();

        let task = tokio::spawn(async move {
            while let Some(entry) = candidates.next().await {
                match entry {
                    Ok(entry) => shared.accept_candidate(pc.as_ref(), entry).await,
                    Err(e) => warn!("Skipping unreadable candidate in {}: {}", key, e),
                }
            }
            debug!("Candidate subscription for {} ended", key);
        });
        self.lock_tasks().push(task);
        Ok(())
    }

    async fn watch_room(
        &self,
        key: &RoomKey,
        role: CallRole,
        pc: Arc<dyn PeerConnection>,
    ) -> Result<(), CallError> {
        let mut changes = self.channel.watch_room(key).await?;
        let shared = Arc::clone(&self.shared);
        let key = key.clone();

        let task = tokio::spawn(async move {
            while let Some(change) = changes.next().await {
                let room = match change {
                    Ok(RoomChange::Updated(room)) => room,
                    Ok(RoomChange::Removed) => {
                        info!("Room {} was removed", key);
                        continue;
                    }
                    Err(e) => {
                        warn!("Unreadable room update in {}: {}", key, e);
                        continue;
                    }
                };
                if role != CallRole::Caller {
                    continue;
                }
                let Some(answer) = room.answer else {
                    continue;
                };
                if shared.answer_applied.swap(true, Ordering::SeqCst) {
                    trace!("Answer for {} already applied", key);
                    continue;
                }

                shared.set_phase(CallPhase::ApplyAnswer);
                match shared.apply_remote_description(pc.as_ref(), &answer).await {
                    Ok(()) => {
                        shared.set_phase(CallPhase::Connected);
                        info!("Call in room {} connected", key);
                    }
                    Err(e) => {
                        error!("Failed to apply answer in {}: {:#}", key, e);
                        shared.release_local().await;
                        shared.set_phase(CallPhase::Closed);
                        break;
                    }
                }
            }
        });
        self.lock_tasks().push(task);
        Ok(())
    }

    fn lock_tasks(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for PeerSession {
    fn drop(&mut self) {
        for handle in self.lock_tasks().drain(..) {
            handle.abort();
        }
    }
}

/// Forward local candidates to this side's log and mirror the link state.
async fn pump_transport_events(
    mut events: mpsc::Receiver<TransportEvent>,
    channel: SignalingChannel,
    key: RoomKey,
    side: CandidateSide,
    shared: Arc<SessionShared>,
) {
    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::CandidateGenerated(candidate) => {
                if let Err(e) = channel.append_candidate(&key, side, &candidate).await {
                    warn!("Failed to publish local candidate to {}: {}", key, e);
                }
            }
            TransportEvent::StateChanged(state) => {
                shared.link.send_replace(state);
                if state.is_lost() {
                    warn!("Link in room {} is {:?}", key, state);
                }
            }
            TransportEvent::RemoteTrack { kind, id } => {
                info!("Remote {:?} track {} in room {}", kind, id, key);
            }
        }
    }
}
