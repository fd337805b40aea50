use hallway_core::{Position, RoomKey};
use thiserror::Error;

/// Failures of the remote document store and the realtime store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("conflicting write to {path}: {reason}")]
    Conflict { path: String, reason: String },

    #[error("malformed document at {path}: {source}")]
    Malformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub fn malformed(path: impl Into<String>, source: serde_json::Error) -> Self {
        StoreError::Malformed {
            path: path.into(),
            source,
        }
    }
}

/// Media acquisition failures (`getUserMedia`-style).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MediaError {
    #[error("media access denied by the user")]
    Denied,

    #[error("media capture unsupported: {0}")]
    Unsupported(String),

    #[error("no capture device for {0}")]
    NoDevice(String),
}

#[derive(Debug, Error)]
pub enum CallError {
    #[error("media acquisition failed: {0}")]
    Media(#[from] MediaError),

    #[error("room {0} has no offer to answer")]
    SignalingNotFound(RoomKey),

    #[error("call already started on this session")]
    AlreadyStarted,

    #[error("signaling store error: {0}")]
    Store(#[from] StoreError),

    #[error("peer connection error: {0:#}")]
    Rtc(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("fallback position ({}, {}) is not a valid position on this map", .0.x, .0.y)]
    UnsafeFallback(Position),

    #[error("map of {width}x{height} is too small for an edge buffer of {buffer}")]
    MapTooSmall { width: f64, height: f64, buffer: f64 },

    #[error("search step must be positive, got {0}")]
    InvalidSearchStep(f64),
}

/// Errors raised while replaying a snapshot. Never escapes `SessionContinuity::restore`.
#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("failed to join room {room_id}: {reason}")]
    JoinFailed { room_id: String, reason: String },

    #[error("snapshot position ({}, {}) is not finite", .0.x, .0.y)]
    InvalidPosition(Position),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}
