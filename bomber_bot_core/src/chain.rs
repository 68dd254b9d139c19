//! Chain-reaction simulation: effective detonation turns and blast effects.

use std::collections::{BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{
    Bomb, Direction, Item, Position,
    board::{Board, BoxKind, CellType},
    map::Grid,
};

/// Highest countdown the server gives a live bomb.
pub const FUSE_CEILING: usize = 9;

/// Something a blast takes out of the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Destroyed {
    Box { position: Position, kind: BoxKind },
    Item(Item),
}

impl Destroyed {
    pub fn position(&self) -> Position {
        match self {
            Destroyed::Box { position, .. } => *position,
            Destroyed::Item(item) => item.position,
        }
    }

    pub fn is_box(&self) -> bool {
        matches!(self, Destroyed::Box { .. })
    }
}

/// Private view of the arena used while propagating chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Scratch {
    #[default]
    Open,
    Wall,
    /// A box or an item: absorbs the blast and is gone afterwards.
    Solid,
    Bomb,
}

fn scratch_board(board: &Board, items: &[Item], bombs: &[Bomb]) -> Grid<Scratch> {
    let mut scratch = Grid::from_generator(board.width(), board.height(), |x, y| {
        match board.cell(Position { x, y }) {
            Some(CellType::Wall) => Scratch::Wall,
            Some(CellType::Box(_)) => Scratch::Solid,
            _ => Scratch::Open,
        }
    });
    for item in items {
        scratch[item.position] = Scratch::Solid;
    }
    for bomb in bombs {
        scratch[bomb.position] = Scratch::Bomb;
    }
    scratch
}

/// Rewrites every countdown to the turn the bomb actually goes off once chain
/// reactions are taken into account.
///
/// Passes run in countdown order. Each pass detonates the bombs due at that
/// turn plus everything their blasts reach, transitively, and pulls the
/// countdown of every bomb caught that way down to the pass turn. Boxes, items
/// and bombs consumed by a pass are opened up for the following passes, so a
/// later blast can travel further than it could have at the start.
pub fn normalize_countdowns(board: &Board, items: &[Item], bombs: &mut [Bomb]) {
    if bombs.len() < 2 {
        return;
    }

    let mut scratch = scratch_board(board, items, bombs);
    let mut consumed = vec![false; bombs.len()];
    // Turns with nothing due change nothing, so only the countdowns present are visited.
    let turns: BTreeSet<usize> = bombs.iter().map(|b| b.countdown).collect();

    for turn in turns {
        let mut worklist: VecDeque<usize> = (0..bombs.len())
            .filter(|&i| !consumed[i] && bombs[i].countdown == turn)
            .collect();
        let mut opened = Vec::new();

        while let Some(index) = worklist.pop_front() {
            if consumed[index] {
                continue;
            }
            consumed[index] = true;
            let Bomb {
                position, range, ..
            } = bombs[index];
            opened.push(position);

            // Bombs stacked on the same cell go off together.
            let mut caught = vec![position];
            for direction in Direction::ALL {
                for step in 1..range {
                    let Some(cell) = scratch.step(position, direction, step) else {
                        break;
                    };
                    match scratch[cell] {
                        Scratch::Open => {}
                        Scratch::Wall => break,
                        Scratch::Solid => {
                            opened.push(cell);
                            break;
                        }
                        Scratch::Bomb => {
                            caught.push(cell);
                            break;
                        }
                    }
                }
            }

            for cell in caught {
                for (other, bomb) in bombs.iter_mut().enumerate() {
                    if !consumed[other] && bomb.position == cell {
                        if bomb.countdown > turn {
                            trace!(
                                x = cell.x,
                                y = cell.y,
                                from = bomb.countdown,
                                to = turn,
                                "chain pulls bomb earlier"
                            );
                        }
                        bomb.countdown = bomb.countdown.min(turn);
                        worklist.push_back(other);
                    }
                }
            }
        }

        for cell in opened {
            scratch[cell] = Scratch::Open;
        }
    }
}

/// Cells a bomb's blast reaches, origin included.
///
/// A wall stops an arm before it; a box, an item or another bomb is reached
/// and stops the arm.
pub fn blast_footprint(
    board: &Board,
    items: &[Item],
    bombs: &[Bomb],
    bomb: &Bomb,
) -> Vec<Position> {
    let mut cells = vec![bomb.position];
    for direction in Direction::ALL {
        for step in 1..bomb.range {
            let Some(cell) = board.grid().step(bomb.position, direction, step) else {
                break;
            };
            if board.is_wall(cell) {
                break;
            }
            cells.push(cell);
            let absorbs = board.is_box(cell)
                || items.iter().any(|i| i.position == cell)
                || bombs.iter().any(|b| b.position == cell);
            if absorbs {
                break;
            }
        }
    }
    cells
}

/// Boxes and items a single blast would destroy. Never touches the board.
///
/// Walls and other bombs stop an arm without being reported; chaining is
/// the business of [`normalize_countdowns`].
pub fn blast_query(board: &Board, items: &[Item], bombs: &[Bomb], bomb: &Bomb) -> Vec<Destroyed> {
    let mut destroyed = Vec::new();
    for direction in Direction::ALL {
        for step in 1..bomb.range {
            let Some(cell) = board.grid().step(bomb.position, direction, step) else {
                break;
            };
            match board.cell(cell) {
                Some(CellType::Wall) | None => break,
                Some(CellType::Box(kind)) => {
                    destroyed.push(Destroyed::Box {
                        position: cell,
                        kind,
                    });
                    break;
                }
                Some(CellType::Floor) => {}
            }
            if bombs.iter().any(|b| b.position == cell) {
                break;
            }
            if let Some(item) = items.iter().find(|i| i.position == cell) {
                destroyed.push(Destroyed::Item(*item));
                break;
            }
        }
    }
    destroyed
}

/// Removes what a blast destroyed: boxes become floor and reveal their item,
/// items hit disappear.
pub fn apply_destruction(board: &mut Board, items: &mut Vec<Item>, destroyed: &[Destroyed]) {
    for hit in destroyed {
        match *hit {
            Destroyed::Box { position, kind } => {
                board.clear(position);
                if let Some(kind) = kind.reveals() {
                    items.push(Item { position, kind });
                }
            }
            Destroyed::Item(item) => items.retain(|i| i.position != item.position),
        }
    }
}

/// [`blast_query`] followed by [`apply_destruction`].
pub fn apply_blast(
    board: &mut Board,
    items: &mut Vec<Item>,
    bombs: &[Bomb],
    bomb: &Bomb,
) -> Vec<Destroyed> {
    let destroyed = blast_query(board, items, bombs, bomb);
    apply_destruction(board, items, &destroyed);
    destroyed
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng, rngs::StdRng};

    use super::*;
    use crate::ItemKind;

    fn bomb(x: usize, y: usize, countdown: usize, range: usize) -> Bomb {
        Bomb {
            owner: 0,
            position: Position::new(x, y),
            countdown,
            range,
        }
    }

    fn with_boxes(width: usize, height: usize, boxes: &[(usize, usize)]) -> Board {
        let mut board = Board::open(width, height);
        for &(x, y) in boxes {
            board
                .set(Position::new(x, y), CellType::Box(BoxKind::Plain))
                .unwrap();
        }
        board
    }

    #[test]
    fn single_bomb_is_left_alone() {
        let board = with_boxes(13, 11, &[(5, 7)]);
        let mut bombs = vec![bomb(5, 5, 8, 3)];
        normalize_countdowns(&board, &[], &mut bombs);
        assert_eq!(bombs[0].countdown, 8);

        let mut none: Vec<Bomb> = Vec::new();
        normalize_countdowns(&board, &[], &mut none);
        assert!(none.is_empty());
    }

    #[test]
    fn query_stops_at_the_first_box() {
        let board = with_boxes(13, 11, &[(5, 7), (5, 8)]);
        let placed = bomb(5, 5, 8, 3);
        let destroyed = blast_query(&board, &[], &[placed], &placed);
        assert_eq!(
            destroyed,
            vec![Destroyed::Box {
                position: Position::new(5, 7),
                kind: BoxKind::Plain,
            }]
        );
    }

    #[test]
    fn query_is_idempotent_without_destruction() {
        let board = with_boxes(9, 9, &[(4, 2), (6, 4), (1, 4)]);
        let items = [Item {
            position: Position::new(4, 6),
            kind: ItemKind::ExtraRange,
        }];
        let placed = bomb(4, 4, 8, 4);
        let first = blast_query(&board, &items, &[placed], &placed);
        let second = blast_query(&board, &items, &[placed], &placed);
        assert_eq!(first, second);
        assert_eq!(first.len(), 4);
        assert_eq!(first.iter().filter(|d| d.is_box()).count(), 3);
    }

    #[test]
    fn query_does_not_report_walls_or_bombs() {
        let mut board = with_boxes(9, 9, &[(4, 1), (1, 4)]);
        board.set(Position::new(4, 3), CellType::Wall).unwrap();
        let placed = bomb(4, 4, 8, 4);
        let blocker = bomb(3, 4, 5, 2);
        let destroyed = blast_query(&board, &[], &[placed, blocker], &placed);
        assert!(destroyed.is_empty());
    }

    #[test]
    fn chain_pulls_later_bomb_earlier() {
        let board = Board::open(13, 11);
        let mut bombs = vec![bomb(2, 2, 3, 3), bomb(2, 4, 8, 3)];
        normalize_countdowns(&board, &[], &mut bombs);
        assert_eq!(bombs[0].countdown, 3);
        assert_eq!(bombs[1].countdown, 3);
    }

    #[test]
    fn far_off_countdowns_resolve_without_walking_every_turn() {
        let board = Board::open(13, 11);
        let mut bombs = vec![
            bomb(2, 2, 3, 3),
            bomb(2, 4, usize::MAX, 3),
            bomb(9, 9, usize::MAX, 2),
        ];
        normalize_countdowns(&board, &[], &mut bombs);
        assert_eq!(bombs[1].countdown, 3);
        assert_eq!(bombs[2].countdown, usize::MAX);
    }

    #[test]
    fn walls_and_boxes_break_the_chain() {
        let mut board = Board::open(13, 11);
        board.set(Position::new(2, 3), CellType::Wall).unwrap();
        let mut bombs = vec![bomb(2, 2, 3, 3), bomb(2, 4, 8, 3)];
        normalize_countdowns(&board, &[], &mut bombs);
        assert_eq!(bombs[1].countdown, 8);

        let board = with_boxes(13, 11, &[(2, 3)]);
        let mut bombs = vec![bomb(2, 2, 3, 3), bomb(2, 4, 8, 3)];
        normalize_countdowns(&board, &[], &mut bombs);
        assert_eq!(bombs[1].countdown, 8);
    }

    #[test]
    fn items_absorb_like_boxes() {
        let board = Board::open(13, 11);
        let items = [Item {
            position: Position::new(2, 3),
            kind: ItemKind::ExtraBomb,
        }];
        let mut bombs = vec![bomb(2, 2, 3, 3), bomb(2, 4, 8, 3)];
        normalize_countdowns(&board, &items, &mut bombs);
        assert_eq!(bombs[1].countdown, 8);
    }

    #[test]
    fn earlier_pass_opens_the_way_for_a_later_chain() {
        let board = with_boxes(9, 9, &[(2, 3)]);
        let mut bombs = vec![bomb(4, 3, 2, 3), bomb(2, 2, 4, 3), bomb(2, 4, 8, 3)];
        normalize_countdowns(&board, &[], &mut bombs);
        assert_eq!(bombs[0].countdown, 2);
        assert_eq!(bombs[1].countdown, 4);
        assert_eq!(bombs[2].countdown, 4);
    }

    #[test]
    fn linear_chains_collapse_to_their_minimum() {
        let mut rng = StdRng::seed_from_u64(0x5eed_b0b);
        for _ in 0..200 {
            let length = rng.random_range(2..6);
            let range = rng.random_range(2..5);
            let board = Board::open(30, 5);
            let mut x = rng.random_range(0..3);
            let mut bombs = Vec::new();
            for _ in 0..length {
                bombs.push(bomb(x, 2, rng.random_range(1..=8), range));
                // Next link sits strictly inside this one's reach.
                x += rng.random_range(1..range);
            }
            let minimum = bombs.iter().map(|b| b.countdown).min().unwrap();
            normalize_countdowns(&board, &[], &mut bombs);
            assert!(
                bombs.iter().all(|b| b.countdown == minimum),
                "{bombs:?} should all detonate at {minimum}"
            );
        }
    }

    #[test]
    fn footprint_includes_absorbers_but_not_walls() {
        let mut board = with_boxes(7, 7, &[(3, 1)]);
        board.set(Position::new(4, 3), CellType::Wall).unwrap();
        let placed = bomb(3, 3, 5, 3);
        let footprint = blast_footprint(&board, &[], &[placed], &placed);
        assert!(footprint.contains(&Position::new(3, 3)));
        assert!(footprint.contains(&Position::new(3, 1)));
        assert!(footprint.contains(&Position::new(3, 2)));
        assert!(!footprint.contains(&Position::new(4, 3)));
        assert!(!footprint.contains(&Position::new(5, 3)));
        assert!(footprint.contains(&Position::new(1, 3)));
        assert!(!footprint.contains(&Position::new(0, 3)));
        assert_eq!(footprint.len(), 7);
    }

    #[test]
    fn applied_blast_reveals_items() {
        let mut board = Board::open(7, 7);
        board
            .set(Position::new(3, 5), CellType::Box(BoxKind::ExtraRange))
            .unwrap();
        let mut items = vec![Item {
            position: Position::new(1, 3),
            kind: ItemKind::ExtraBomb,
        }];
        let placed = bomb(3, 3, 1, 3);
        let destroyed = apply_blast(&mut board, &mut items, &[placed], &placed);
        assert_eq!(destroyed.len(), 2);
        assert!(board.is_floor(Position::new(3, 5)));
        assert_eq!(
            items,
            vec![Item {
                position: Position::new(3, 5),
                kind: ItemKind::ExtraRange,
            }]
        );
    }
}
