use crate::config::PresenceConfig;
use crate::error::GeometryError;
use hallway_core::{Position, Rect, Zone};
use std::f64::consts::FRAC_1_SQRT_2;

/// N, NE, E, SE, S, SW, W, NW as unit vectors (screen coordinates, y grows downwards).
const RING_DIRECTIONS: [(f64, f64); 8] = [
    (0.0, -1.0),
    (FRAC_1_SQRT_2, -FRAC_1_SQRT_2),
    (1.0, 0.0),
    (FRAC_1_SQRT_2, FRAC_1_SQRT_2),
    (0.0, 1.0),
    (-FRAC_1_SQRT_2, FRAC_1_SQRT_2),
    (-1.0, 0.0),
    (-FRAC_1_SQRT_2, -FRAC_1_SQRT_2),
];

/// Static map geometry and the collision rules derived from it.
///
/// Pure: no I/O, no interior mutability. Every query gives the same answer for the same
/// input.
#[derive(Debug, Clone)]
pub struct PositionStore {
    width: f64,
    height: f64,
    edge_buffer: f64,
    avatar_width: f64,
    avatar_height: f64,
    obstacles: Vec<Rect>,
    zones: Vec<Zone>,
    safe_fallback: Position,
    search_step: f64,
    search_max_radius: f64,
}

impl PositionStore {
    pub fn new(config: &PresenceConfig) -> Result<Self, GeometryError> {
        if config.map_width <= 2.0 * config.edge_buffer
            || config.map_height <= 2.0 * config.edge_buffer
        {
            return Err(GeometryError::MapTooSmall {
                width: config.map_width,
                height: config.map_height,
                buffer: config.edge_buffer,
            });
        }
        if !(config.search_step > 0.0) {
            return Err(GeometryError::InvalidSearchStep(config.search_step));
        }

        let store = Self {
            width: config.map_width,
            height: config.map_height,
            edge_buffer: config.edge_buffer,
            avatar_width: config.avatar_width,
            avatar_height: config.avatar_height,
            obstacles: config.obstacles.clone(),
            zones: config.zones.clone(),
            safe_fallback: config.safe_fallback,
            search_step: config.search_step,
            search_max_radius: config.search_max_radius,
        };

        if !store.is_valid(store.safe_fallback) {
            return Err(GeometryError::UnsafeFallback(store.safe_fallback));
        }
        Ok(store)
    }

    /// True when `pos` respects the edge buffer and the avatar footprint centered on it
    /// touches no obstacle.
    pub fn is_valid(&self, pos: Position) -> bool {
        if !pos.is_finite() {
            return false;
        }
        if pos.x < self.edge_buffer
            || pos.y < self.edge_buffer
            || pos.x > self.width - self.edge_buffer
            || pos.y > self.height - self.edge_buffer
        {
            return false;
        }

        let footprint = self.footprint(pos);
        !self.obstacles.iter().any(|o| o.intersects(&footprint))
    }

    /// `pos` itself when valid, else the first valid point of an expanding 8-direction ring
    /// search, else the safe fallback.
    pub fn find_valid_near(&self, pos: Position) -> Position {
        if self.is_valid(pos) {
            return pos;
        }
        if !pos.is_finite() {
            return self.safe_fallback;
        }

        let rings = (self.search_max_radius / self.search_step).floor() as u32;
        for ring in 1..=rings {
            let radius = self.search_step * f64::from(ring);
            for (dx, dy) in RING_DIRECTIONS {
                let candidate = pos.offset(dx * radius, dy * radius);
                if self.is_valid(candidate) {
                    return candidate;
                }
            }
        }

        self.safe_fallback
    }

    pub fn zone_at(&self, pos: Position) -> Option<&Zone> {
        self.zones.iter().find(|z| z.bounds.contains(&pos))
    }

    pub fn footprint(&self, pos: Position) -> Rect {
        Rect::centered(pos, self.avatar_width, self.avatar_height)
    }

    pub fn safe_fallback(&self) -> Position {
        self.safe_fallback
    }

    pub fn obstacles(&self) -> &[Rect] {
        &self.obstacles
    }

    pub fn bounds(&self) -> (f64, f64) {
        (self.width, self.height)
    }
}
