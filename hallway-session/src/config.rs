use crate::error::ConfigError;
use crate::transport::TransportConfig;
use hallway_core::{Position, Rect, Zone};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration. Every section falls back to its defaults when omitted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HallwayConfig {
    pub presence: PresenceConfig,
    pub transport: TransportConfig,
    pub continuity: ContinuityConfig,
}

impl HallwayConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

/// Map geometry and movement tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    pub map_width: f64,
    pub map_height: f64,
    /// Minimum distance between an avatar center and the map edge.
    pub edge_buffer: f64,
    pub avatar_width: f64,
    pub avatar_height: f64,
    pub obstacles: Vec<Rect>,
    pub zones: Vec<Zone>,
    /// Returned by the ring search when nothing valid is found.
    pub safe_fallback: Position,
    pub search_step: f64,
    pub search_max_radius: f64,
    pub frame_interval_ms: u64,
    /// Pixels per frame for click-to-move.
    pub click_speed: f64,
    pub arrival_epsilon: f64,
    /// Pixels per key tick for held keys.
    pub key_speed: f64,
    pub key_interval_ms: u64,
}

impl PresenceConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn key_interval(&self) -> Duration {
        Duration::from_millis(self.key_interval_ms)
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            map_width: 1600.0,
            map_height: 1200.0,
            edge_buffer: 16.0,
            avatar_width: 32.0,
            avatar_height: 32.0,
            obstacles: vec![
                Rect::new(400.0, 300.0, 200.0, 100.0),
                Rect::new(900.0, 600.0, 300.0, 200.0),
            ],
            zones: vec![
                Zone::new("coffee", Rect::new(1200.0, 100.0, 300.0, 250.0)),
                Zone::new("conference", Rect::new(850.0, 550.0, 400.0, 300.0)),
            ],
            safe_fallback: Position::new(100.0, 100.0),
            search_step: 16.0,
            search_max_radius: 320.0,
            frame_interval_ms: 16,
            click_speed: 4.0,
            arrival_epsilon: 1.0,
            key_speed: 3.0,
            key_interval_ms: 16,
        }
    }
}

/// Snapshot cadence, fast-path timeout and restore pacing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContinuityConfig {
    pub snapshot_interval_ms: u64,
    pub settle_debounce_ms: u64,
    pub fast_read_timeout_ms: u64,
    pub durable_read_timeout_ms: u64,
    /// Longest a single tier may take to accept a snapshot before the write is dropped.
    pub write_timeout_ms: u64,
    pub join_settle_ms: u64,
    pub zone_settle_ms: u64,
}

impl ContinuityConfig {
    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_millis(self.snapshot_interval_ms)
    }

    pub fn settle_debounce(&self) -> Duration {
        Duration::from_millis(self.settle_debounce_ms)
    }

    pub fn fast_read_timeout(&self) -> Duration {
        Duration::from_millis(self.fast_read_timeout_ms)
    }

    pub fn durable_read_timeout(&self) -> Duration {
        Duration::from_millis(self.durable_read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn join_settle(&self) -> Duration {
        Duration::from_millis(self.join_settle_ms)
    }

    pub fn zone_settle(&self) -> Duration {
        Duration::from_millis(self.zone_settle_ms)
    }
}

impl Default for ContinuityConfig {
    fn default() -> Self {
        Self {
            snapshot_interval_ms: 30_000,
            settle_debounce_ms: 3_000,
            fast_read_timeout_ms: 1_500,
            durable_read_timeout_ms: 10_000,
            write_timeout_ms: 5_000,
            join_settle_ms: 500,
            zone_settle_ms: 1_500,
        }
    }
}
