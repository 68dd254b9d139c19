//! Line protocol spoken with the game server.
//!
//! Input starts with `width height my_id`. Every turn then sends `height` rows
//! of cell codes, an entity count and one `type owner x y param1 param2` line
//! per entity. Each turn is answered with a single `MOVE x y` or `BOMB x y`.

use std::{fmt, io::BufRead};

use tracing::trace;

use crate::{
    Action, Bomb, EntityId, Item, ItemKind, Player, Position,
    board::{Board, BoxKind, CellType, Snapshot, SnapshotError},
    chain::FUSE_CEILING,
    map::Grid,
};

const ENTITY_PLAYER: usize = 0;
const ENTITY_BOMB: usize = 1;
const ENTITY_ITEM: usize = 2;

/// Errors reading the server's input. None of them is retried: the turn loop
/// stops on the first one.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),
    #[error("input ended in the middle of {0}")]
    UnexpectedEof(&'static str),
    #[error("expected {expected} fields in {what}, found {found}")]
    FieldCount {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("invalid number '{token}' in {what}")]
    BadNumber { token: String, what: &'static str },
    #[error("row {row} has {found} cells, expected {expected}")]
    MalformedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("unknown cell code '{code}' at ({x}, {y})")]
    UnknownCell { code: char, x: usize, y: usize },
    #[error("unknown entity type {0}")]
    UnknownEntity(usize),
    #[error("unknown item type {0}")]
    UnknownItem(usize),
    #[error("bomb at ({x}, {y}) has countdown {countdown}, above the fuse ceiling")]
    FuseOutOfRange { x: usize, y: usize, countdown: usize },
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// First line of the input, sent once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub width: usize,
    pub height: usize,
    pub my_id: EntityId,
}

/// Reads turns off a buffered input stream.
#[derive(Debug)]
pub struct TurnReader<R> {
    input: R,
    header: Header,
    line: String,
}

impl<R: BufRead> TurnReader<R> {
    /// Reads the header line and gets ready for the first turn.
    pub fn open(mut input: R) -> Result<Self, ProtocolError> {
        let mut line = String::new();
        if !next_line(&mut input, &mut line)? {
            return Err(ProtocolError::UnexpectedEof("the header"));
        }
        let [width, height, my_id] = numbers::<3>(&line, "the header")?;
        Ok(TurnReader {
            input,
            header: Header {
                width,
                height,
                my_id,
            },
            line,
        })
    }

    pub fn header(&self) -> Header {
        self.header
    }

    /// Reads the next turn. `Ok(None)` when the input ends cleanly between turns.
    pub fn read_turn(&mut self) -> Result<Option<Snapshot>, ProtocolError> {
        let Header {
            width,
            height,
            my_id,
        } = self.header;

        let mut rows: Vec<Vec<CellType>> = Vec::with_capacity(height);
        for y in 0..height {
            if !next_line(&mut self.input, &mut self.line)? {
                if y == 0 {
                    return Ok(None);
                }
                return Err(ProtocolError::UnexpectedEof("the arena rows"));
            }
            let row = self.line.trim();
            trace!(y, row, "arena row");
            rows.push(parse_row(row, y, width)?);
        }
        let cells = Grid::from_generator(width, height, |x, y| rows[y][x]);

        if !next_line(&mut self.input, &mut self.line)? {
            return Err(ProtocolError::UnexpectedEof("the entity count"));
        }
        let [count] = numbers::<1>(&self.line, "the entity count")?;

        let mut players = Vec::new();
        let mut bombs = Vec::new();
        let mut items = Vec::new();
        for _ in 0..count {
            if !next_line(&mut self.input, &mut self.line)? {
                return Err(ProtocolError::UnexpectedEof("the entity list"));
            }
            let [kind, owner, x, y, param1, param2] = numbers::<6>(&self.line, "an entity")?;
            trace!(kind, owner, x, y, param1, param2, "entity");
            let position = Position { x, y };
            match kind {
                ENTITY_PLAYER => players.push(Player {
                    id: owner,
                    position,
                    capacity: param1,
                    range: param2,
                }),
                ENTITY_BOMB if param1 > FUSE_CEILING => {
                    return Err(ProtocolError::FuseOutOfRange {
                        x,
                        y,
                        countdown: param1,
                    });
                }
                ENTITY_BOMB => bombs.push(Bomb {
                    owner,
                    position,
                    countdown: param1,
                    range: param2,
                }),
                ENTITY_ITEM => items.push(Item {
                    position,
                    kind: item_kind(param1)?,
                }),
                other => return Err(ProtocolError::UnknownEntity(other)),
            }
        }

        let snapshot = Snapshot::new(Board::new(cells), players, bombs, items, my_id)?;
        Ok(Some(snapshot))
    }
}

/// Reads the next non-blank line into `line`. `false` at end of input.
fn next_line(input: &mut impl BufRead, line: &mut String) -> Result<bool, ProtocolError> {
    loop {
        line.clear();
        if input.read_line(line)? == 0 {
            return Ok(false);
        }
        if !line.trim().is_empty() {
            return Ok(true);
        }
    }
}

fn numbers<const N: usize>(line: &str, what: &'static str) -> Result<[usize; N], ProtocolError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() != N {
        return Err(ProtocolError::FieldCount {
            what,
            expected: N,
            found: tokens.len(),
        });
    }
    let mut values = [0; N];
    for (value, token) in values.iter_mut().zip(tokens) {
        *value = token.parse().map_err(|_| ProtocolError::BadNumber {
            token: token.to_string(),
            what,
        })?;
    }
    Ok(values)
}

fn parse_row(row: &str, y: usize, width: usize) -> Result<Vec<CellType>, ProtocolError> {
    let found = row.chars().count();
    if found != width {
        return Err(ProtocolError::MalformedRow {
            row: y,
            expected: width,
            found,
        });
    }
    row.chars()
        .enumerate()
        .map(|(x, code)| match code {
            '.' => Ok(CellType::Floor),
            'X' => Ok(CellType::Wall),
            '0' => Ok(CellType::Box(BoxKind::Plain)),
            '1' => Ok(CellType::Box(BoxKind::ExtraRange)),
            '2' => Ok(CellType::Box(BoxKind::ExtraBomb)),
            code => Err(ProtocolError::UnknownCell { code, x, y }),
        })
        .collect()
}

fn item_kind(code: usize) -> Result<ItemKind, ProtocolError> {
    match code {
        1 => Ok(ItemKind::ExtraRange),
        2 => Ok(ItemKind::ExtraBomb),
        other => Err(ProtocolError::UnknownItem(other)),
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Move(p) => write!(f, "MOVE {} {}", p.x, p.y),
            Action::Bomb(p) => write!(f, "BOMB {} {}", p.x, p.y),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    const TURN: &str = "\
5 3 0
..0..
.X1X.
..2..
4
0 0 0 0 1 3
0 1 4 2 1 3
1 1 4 1 7 3
2 0 3 0 2 0
";

    #[test]
    fn reads_a_full_turn() {
        let mut reader = TurnReader::open(Cursor::new(TURN)).unwrap();
        assert_eq!(
            reader.header(),
            Header {
                width: 5,
                height: 3,
                my_id: 0
            }
        );

        let snapshot = reader.read_turn().unwrap().expect("one turn");
        let board = snapshot.board();
        assert!(board.is_wall(Position::new(1, 1)));
        assert_eq!(
            board.cell(Position::new(2, 1)),
            Some(CellType::Box(BoxKind::ExtraRange))
        );
        assert_eq!(snapshot.me().position, Position::new(0, 0));
        assert_eq!(snapshot.players().len(), 2);
        assert_eq!(snapshot.bombs()[0].countdown, 7);
        assert_eq!(snapshot.items()[0].kind, ItemKind::ExtraBomb);

        assert!(reader.read_turn().unwrap().is_none());
    }

    #[test]
    fn short_row_is_malformed() {
        let input = "3 2 0\n...\n..\n1\n0 0 0 0 1 3\n";
        let mut reader = TurnReader::open(Cursor::new(input)).unwrap();
        let err = reader.read_turn().unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::MalformedRow {
                row: 1,
                expected: 3,
                found: 2
            }
        ));
    }

    #[test]
    fn truncated_turn_is_an_error() {
        let input = "3 2 0\n...\n";
        let mut reader = TurnReader::open(Cursor::new(input)).unwrap();
        assert!(matches!(
            reader.read_turn(),
            Err(ProtocolError::UnexpectedEof(_))
        ));
    }

    #[test]
    fn rejects_unknown_codes() {
        let input = "2 1 0\n.?\n0\n";
        let mut reader = TurnReader::open(Cursor::new(input)).unwrap();
        assert!(matches!(
            reader.read_turn(),
            Err(ProtocolError::UnknownCell { code: '?', x: 1, y: 0 })
        ));

        let input = "2 1 0\n..\n1\n7 0 0 0 0 0\n";
        let mut reader = TurnReader::open(Cursor::new(input)).unwrap();
        assert!(matches!(
            reader.read_turn(),
            Err(ProtocolError::UnknownEntity(7))
        ));
    }

    #[test]
    fn negative_numbers_are_rejected() {
        let input = "2 1 0\n..\n1\n0 0 -1 0 1 3\n";
        let mut reader = TurnReader::open(Cursor::new(input)).unwrap();
        assert!(matches!(
            reader.read_turn(),
            Err(ProtocolError::BadNumber { .. })
        ));
    }

    #[test]
    fn countdowns_beyond_the_fuse_are_rejected() {
        let input = "3 1 0\n...\n3\n0 0 0 0 1 3\n1 0 1 0 3 2\n1 0 2 0 300000000 2\n";
        let mut reader = TurnReader::open(Cursor::new(input)).unwrap();
        assert!(matches!(
            reader.read_turn(),
            Err(ProtocolError::FuseOutOfRange {
                x: 2,
                y: 0,
                countdown: 300000000
            })
        ));

        let input = format!("3 1 0\n...\n2\n0 0 0 0 1 3\n1 0 2 0 {FUSE_CEILING} 2\n");
        let mut reader = TurnReader::open(Cursor::new(input)).unwrap();
        let snapshot = reader.read_turn().unwrap().unwrap();
        assert_eq!(snapshot.bombs()[0].countdown, FUSE_CEILING);
    }

    #[test]
    fn actions_print_as_commands() {
        assert_eq!(Action::Move(Position::new(3, 4)).to_string(), "MOVE 3 4");
        assert_eq!(Action::Bomb(Position::new(0, 12)).to_string(), "BOMB 0 12");
    }
}
