//! Static obstacle cell.

use super::Cell;

/// A static blocked cell. Present for extensibility; worlds may carry none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Obstacle {
    pub pos: Cell,
}

pub type Obstacles = Vec<Obstacle>;
