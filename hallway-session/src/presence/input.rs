use std::f64::consts::FRAC_1_SQRT_2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

/// Set of currently held direction keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeldKeys {
    up: bool,
    down: bool,
    left: bool,
    right: bool,
}

impl HeldKeys {
    pub fn press(&mut self, dir: Direction) {
        self.set(dir, true);
    }

    pub fn release(&mut self, dir: Direction) {
        self.set(dir, false);
    }

    pub fn clear(&mut self) {
        *self = HeldKeys::default();
    }

    fn set(&mut self, dir: Direction, held: bool) {
        match dir {
            Direction::Up => self.up = held,
            Direction::Down => self.down = held,
            Direction::Left => self.left = held,
            Direction::Right => self.right = held,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vector().is_none()
    }

    /// Unit movement vector, or `None` when the held keys cancel out.
    /// Diagonals are normalized so they are not faster than straight moves.
    pub fn vector(&self) -> Option<(f64, f64)> {
        let dx = f64::from(i8::from(self.right) - i8::from(self.left));
        let dy = f64::from(i8::from(self.down) - i8::from(self.up));
        match (dx != 0.0, dy != 0.0) {
            (false, false) => None,
            (true, true) => Some((dx * FRAC_1_SQRT_2, dy * FRAC_1_SQRT_2)),
            _ => Some((dx, dy)),
        }
    }
}
