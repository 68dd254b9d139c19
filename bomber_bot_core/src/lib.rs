use serde::{Deserialize, Serialize};

pub mod agent;
pub mod board;
pub mod chain;
pub mod map;
pub mod protocol;
pub mod search;

/// Unique identifier for agents, as given by the game server.
pub type EntityId = usize;

/// Represents a 2D coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: usize,
    pub y: usize,
}

impl Position {
    pub const fn new(x: usize, y: usize) -> Self {
        Position { x, y }
    }
}

/// The four cardinal directions a blast arm or a step can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Left,
    Down,
    Right,
}

impl Direction {
    /// Expansion order used by the searches; discovery order depends on it.
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Left,
        Direction::Down,
        Direction::Right,
    ];

    #[inline]
    pub fn delta(self) -> (isize, isize) {
        match self {
            Direction::Up => (0, -1),
            Direction::Left => (-1, 0),
            Direction::Down => (0, 1),
            Direction::Right => (1, 0),
        }
    }
}

/// Kind of power-up an item grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemKind {
    ExtraRange,
    ExtraBomb,
}

/// A power-up lying on the floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Item {
    pub position: Position,
    pub kind: ItemKind,
}

/// An agent in the arena, either the controlled one or an opponent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: EntityId,
    pub position: Position,
    /// How many bombs this agent may have live at once.
    pub capacity: usize,
    pub range: usize,
}

/// A live bomb. `countdown` is the number of turns until it detonates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bomb {
    pub owner: EntityId,
    pub position: Position,
    pub countdown: usize,
    /// Cells reached per arm, origin included.
    pub range: usize,
}

/// The command emitted for one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Move(Position),
    /// Place a bomb on the current cell, then move toward the position.
    Bomb(Position),
}
