use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{
    Bomb, EntityId, Item, ItemKind, Player, Position,
    chain::{self, Destroyed},
    map::{Grid, GridError},
};

/// What a destructible box leaves behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoxKind {
    Plain,
    ExtraRange,
    ExtraBomb,
}

impl BoxKind {
    /// The item revealed when this box is destroyed.
    pub fn reveals(self) -> Option<ItemKind> {
        match self {
            BoxKind::Plain => None,
            BoxKind::ExtraRange => Some(ItemKind::ExtraRange),
            BoxKind::ExtraBomb => Some(ItemKind::ExtraBomb),
        }
    }
}

/// Represents the static type of a cell in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CellType {
    #[default]
    Floor,
    Wall,
    Box(BoxKind),
}

/// Cell classification of the arena for one turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    cells: Grid<CellType>,
}

impl Board {
    pub fn new(cells: Grid<CellType>) -> Self {
        Board { cells }
    }

    /// An arena with no walls or boxes.
    pub fn open(width: usize, height: usize) -> Self {
        Board {
            cells: Grid::new(width, height),
        }
    }

    pub fn width(&self) -> usize {
        self.cells.width()
    }

    pub fn height(&self) -> usize {
        self.cells.height()
    }

    pub fn grid(&self) -> &Grid<CellType> {
        &self.cells
    }

    #[inline]
    pub fn in_bounds(&self, position: Position) -> bool {
        self.cells.contains(position)
    }

    /// Cell classification, `None` off the arena.
    #[inline]
    pub fn cell(&self, position: Position) -> Option<CellType> {
        self.cells.get(position.x, position.y).copied()
    }

    #[inline]
    pub fn is_floor(&self, position: Position) -> bool {
        self.cell(position) == Some(CellType::Floor)
    }

    #[inline]
    pub fn is_wall(&self, position: Position) -> bool {
        self.cell(position) == Some(CellType::Wall)
    }

    #[inline]
    pub fn is_box(&self, position: Position) -> bool {
        matches!(self.cell(position), Some(CellType::Box(_)))
    }

    /// Turns a cell into floor. Only meant for private copies of a turn's board.
    pub fn clear(&mut self, position: Position) {
        if let Some(cell) = self.cells.get_mut(position.x, position.y) {
            *cell = CellType::Floor;
        }
    }

    pub fn set(&mut self, position: Position, cell: CellType) -> Result<(), GridError> {
        self.cells.set(position.x, position.y, cell)
    }
}

/// Errors raised while assembling a turn snapshot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SnapshotError {
    #[error("controlled agent {0} is not present in this turn")]
    SelfMissing(EntityId),
    #[error("entity at ({x}, {y}) lies outside the {width}x{height} arena")]
    OutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    },
}

/// Everything known about one turn. Built fresh every turn and passed by
/// reference to every stage of the decision.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    board: Board,
    players: Vec<Player>,
    /// Countdowns are effective, chain reactions already resolved.
    bombs: Vec<Bomb>,
    items: Vec<Item>,
    me: EntityId,
    me_index: usize,
}

impl Snapshot {
    pub fn new(
        board: Board,
        players: Vec<Player>,
        mut bombs: Vec<Bomb>,
        items: Vec<Item>,
        me: EntityId,
    ) -> Result<Self, SnapshotError> {
        let positions = players
            .iter()
            .map(|p| p.position)
            .chain(bombs.iter().map(|b| b.position))
            .chain(items.iter().map(|i| i.position));
        for position in positions {
            if !board.in_bounds(position) {
                return Err(SnapshotError::OutOfBounds {
                    x: position.x,
                    y: position.y,
                    width: board.width(),
                    height: board.height(),
                });
            }
        }
        let me_index = players
            .iter()
            .position(|p| p.id == me)
            .ok_or(SnapshotError::SelfMissing(me))?;

        chain::normalize_countdowns(&board, &items, &mut bombs);

        Ok(Snapshot {
            board,
            players,
            bombs,
            items,
            me,
            me_index,
        })
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn bombs(&self) -> &[Bomb] {
        &self.bombs
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn my_id(&self) -> EntityId {
        self.me
    }

    /// The controlled agent.
    pub fn me(&self) -> &Player {
        &self.players[self.me_index]
    }

    pub fn opponents(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(|p| p.id != self.me)
    }

    pub fn item_at(&self, position: Position) -> Option<&Item> {
        self.items.iter().find(|i| i.position == position)
    }

    pub fn bomb_at(&self, position: Position) -> Option<&Bomb> {
        self.bombs.iter().find(|b| b.position == position)
    }

    /// Bombs `player` may still place: capacity minus its live bombs, never negative.
    pub fn placement_budget(&self, player: &Player) -> usize {
        let live = self.bombs.iter().filter(|b| b.owner == player.id).count();
        player.capacity.saturating_sub(live)
    }

    /// This turn's bombs plus hypothetical `extra` ones, chains re-resolved.
    pub fn bombs_with(&self, extra: &[Bomb]) -> Vec<Bomb> {
        let mut bombs = self.bombs.clone();
        bombs.extend_from_slice(extra);
        chain::normalize_countdowns(&self.board, &self.items, &mut bombs);
        bombs
    }

    /// Forecast of the arena once every bomb due within `turns` has gone off.
    ///
    /// Bombs detonate in countdown order; boxes hit reveal their items and items
    /// hit disappear. Remaining bombs keep their countdown shifted by `turns`.
    pub fn after_detonations(&self, turns: usize) -> (Snapshot, Vec<Destroyed>) {
        let mut board = self.board.clone();
        let mut items = self.items.clone();
        let due: Vec<Bomb> = self
            .bombs
            .iter()
            .filter(|b| b.countdown <= turns)
            .copied()
            .collect();

        let mut destroyed = Vec::new();
        let waves: BTreeSet<usize> = due.iter().map(|b| b.countdown).collect();
        for countdown in waves {
            // Blasts sharing a turn all see the board as it was before any of them.
            let wave: Vec<Bomb> = due
                .iter()
                .filter(|b| b.countdown == countdown)
                .copied()
                .collect();
            let standing: Vec<Bomb> = self
                .bombs
                .iter()
                .filter(|b| b.countdown >= countdown)
                .copied()
                .collect();
            let mut hits = Vec::new();
            for bomb in &wave {
                for hit in chain::blast_query(&board, &items, &standing, bomb) {
                    if !hits.contains(&hit) {
                        hits.push(hit);
                    }
                }
            }
            chain::apply_destruction(&mut board, &mut items, &hits);
            destroyed.extend(hits);
        }

        let bombs = self
            .bombs
            .iter()
            .filter(|b| b.countdown > turns)
            .map(|b| Bomb {
                countdown: b.countdown - turns,
                ..*b
            })
            .collect();

        let snapshot = Snapshot {
            board,
            players: self.players.clone(),
            bombs,
            items,
            me: self.me,
            me_index: self.me_index,
        };
        (snapshot, destroyed)
    }
}
