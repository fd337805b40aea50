use crate::error::MediaError;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

/// One captured audio or video track.
///
/// `enabled` mutes the track without releasing the device; `stop` releases it for good.
#[derive(Debug)]
pub struct MediaTrack {
    id: String,
    stream_id: String,
    kind: TrackKind,
    enabled: AtomicBool,
    stopped: AtomicBool,
}

impl MediaTrack {
    pub fn new(kind: TrackKind, id: impl Into<String>, stream_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            stream_id: stream_id.into(),
            kind,
            enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            debug!("Stopped {:?} track {}", self.kind, self.id);
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// A captured local stream. Clones share the same tracks.
#[derive(Debug, Clone)]
pub struct LocalMedia {
    stream_id: String,
    tracks: Vec<Arc<MediaTrack>>,
}

impl LocalMedia {
    pub fn new(stream_id: impl Into<String>, tracks: Vec<Arc<MediaTrack>>) -> Self {
        Self {
            stream_id: stream_id.into(),
            tracks,
        }
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn tracks(&self) -> &[Arc<MediaTrack>] {
        &self.tracks
    }

    pub fn tracks_of(&self, kind: TrackKind) -> impl Iterator<Item = &Arc<MediaTrack>> {
        self.tracks.iter().filter(move |t| t.kind() == kind)
    }

    /// Mute or unmute every track of `kind`.
    pub fn set_enabled(&self, kind: TrackKind, enabled: bool) {
        for track in self.tracks_of(kind) {
            track.set_enabled(enabled);
        }
    }

    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.tracks.iter().all(|t| t.is_stopped())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }
}

/// `getUserMedia`-style capture.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn get_user_media(&self, constraints: MediaConstraints) -> Result<LocalMedia, MediaError>;
}

/// Capture without hardware: hands out silent tracks for the requested kinds.
#[derive(Debug, Clone)]
pub struct SyntheticMediaDevices {
    pub has_microphone: bool,
    pub has_camera: bool,
}

impl Default for SyntheticMediaDevices {
    fn default() -> Self {
        Self {
            has_microphone: true,
            has_camera: true,
        }
    }
}

#[async_trait]
impl MediaDevices for SyntheticMediaDevices {
    async fn get_user_media(&self, constraints: MediaConstraints) -> Result<LocalMedia, MediaError> {
        if !constraints.audio && !constraints.video {
            return Err(MediaError::Unsupported(
                "at least one of audio or video must be requested".into(),
            ));
        }
        if constraints.audio && !self.has_microphone {
            return Err(MediaError::NoDevice("audio".into()));
        }
        if constraints.video && !self.has_camera {
            return Err(MediaError::NoDevice("video".into()));
        }

        let stream_id = format!("stream-{}", Uuid::new_v4());
        let mut tracks = Vec::new();
        if constraints.audio {
            tracks.push(Arc::new(MediaTrack::new(
                TrackKind::Audio,
                format!("audio-{}", Uuid::new_v4()),
                stream_id.clone(),
            )));
        }
        if constraints.video {
            tracks.push(Arc::new(MediaTrack::new(
                TrackKind::Video,
                format!("video-{}", Uuid::new_v4()),
                stream_id.clone(),
            )));
        }
        Ok(LocalMedia::new(stream_id, tracks))
    }
}
