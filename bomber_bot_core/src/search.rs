//! Breadth-first search over (x, y, turn) with bombs going off as time passes.

use std::collections::{HashMap, HashSet, VecDeque};
use std::iter;

use serde::{Deserialize, Serialize};

use crate::{Bomb, Item, Position, board::Board, chain};

/// A cell at a given number of turns from now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SpaceTime {
    pub x: usize,
    pub y: usize,
    pub t: usize,
}

impl SpaceTime {
    pub const fn at(position: Position, t: usize) -> Self {
        SpaceTime {
            x: position.x,
            y: position.y,
            t,
        }
    }

    pub const fn position(&self) -> Position {
        Position {
            x: self.x,
            y: self.y,
        }
    }
}

/// Result of a goal-driven search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// Steps after the start up to and including the goal. Empty when the
    /// start itself satisfied the goal.
    Found(Vec<SpaceTime>),
    Exhausted,
}

impl SearchOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, SearchOutcome::Found(_))
    }

    pub fn into_path(self) -> Option<Vec<SpaceTime>> {
        match self {
            SearchOutcome::Found(path) => Some(path),
            SearchOutcome::Exhausted => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Threat {
    position: Position,
    countdown: usize,
    footprint: HashSet<Position>,
}

/// Reachability over one board and one set of effective countdowns.
#[derive(Debug, Clone)]
pub struct Reachability<'a> {
    board: &'a Board,
    threats: Vec<Threat>,
    horizon: usize,
}

/// Default number of turns explored: the arena's largest dimension.
pub fn default_horizon(board: &Board) -> usize {
    board.width().max(board.height())
}

impl<'a> Reachability<'a> {
    /// `bombs` must already carry effective countdowns.
    pub fn new(board: &'a Board, items: &[Item], bombs: &[Bomb], horizon: usize) -> Self {
        let threats = bombs
            .iter()
            .map(|bomb| Threat {
                position: bomb.position,
                countdown: bomb.countdown,
                footprint: chain::blast_footprint(board, items, bombs, bomb)
                    .into_iter()
                    .collect(),
            })
            .collect();
        Reachability {
            board,
            threats,
            horizon,
        }
    }

    /// Whether no bomb, whatever its countdown, can reach `position`.
    pub fn is_safe(&self, position: Position) -> bool {
        self.threats
            .iter()
            .all(|threat| !threat.footprint.contains(&position))
    }

    /// Whether a blast hits `position` for an agent arriving there at turn `t`.
    ///
    /// A bomb with effective countdown `c` only hurts arrivals at `c + 1`; the
    /// cell is clear again the turn after.
    pub fn struck(&self, position: Position, t: usize) -> bool {
        self.threats
            .iter()
            .any(|threat| {
                Some(threat.countdown) == t.checked_sub(1) && threat.footprint.contains(&position)
            })
    }

    /// Whether an agent may stand on `position` at turn `t`.
    pub fn admissible(&self, position: Position, t: usize) -> bool {
        if !self.board.is_floor(position) {
            return false;
        }
        // Bombs that went off before the previous turn are gone.
        let blocked = self
            .threats
            .iter()
            .any(|threat| threat.countdown >= t.saturating_sub(1) && threat.position == position);
        !blocked && !self.struck(position, t)
    }

    /// Lazily walks every spacetime position reachable from `start`, layer by
    /// layer, up to `start.t + horizon`. The start is yielded first.
    pub fn explore(&self, start: SpaceTime) -> Explore<'_, 'a> {
        self.explore_within(start, self.horizon)
    }

    pub fn explore_within(&self, start: SpaceTime, horizon: usize) -> Explore<'_, 'a> {
        Explore {
            reach: self,
            start,
            limit: start.t + horizon,
            layer: Vec::new(),
            layer_t: start.t,
            ready: VecDeque::from([start]),
            parents: HashMap::new(),
            started: false,
        }
    }

    /// First reachable spacetime position satisfying `goal`, with the path to it.
    pub fn search(&self, start: SpaceTime, goal: impl Fn(SpaceTime) -> bool) -> SearchOutcome {
        self.search_within(start, self.horizon, goal)
    }

    pub fn search_within(
        &self,
        start: SpaceTime,
        horizon: usize,
        goal: impl Fn(SpaceTime) -> bool,
    ) -> SearchOutcome {
        let mut explore = self.explore_within(start, horizon);
        while let Some(state) = explore.next() {
            if goal(state) {
                return SearchOutcome::Found(explore.path_to(state));
            }
        }
        SearchOutcome::Exhausted
    }

    /// Nearest cell no bomb can reach.
    pub fn search_safe(&self, start: SpaceTime) -> SearchOutcome {
        self.search(start, |state| self.is_safe(state.position()))
    }

    /// Earliest arrival at `destination`.
    pub fn search_to(&self, start: SpaceTime, destination: Position) -> SearchOutcome {
        self.search(start, |state| state.position() == destination)
    }
}

/// Iterator returned by [`Reachability::explore`].
#[derive(Debug)]
pub struct Explore<'r, 'a> {
    reach: &'r Reachability<'a>,
    start: SpaceTime,
    limit: usize,
    layer: Vec<SpaceTime>,
    layer_t: usize,
    ready: VecDeque<SpaceTime>,
    parents: HashMap<SpaceTime, SpaceTime>,
    started: bool,
}

impl Explore<'_, '_> {
    /// Path from the step after the start to `goal`, which must have been yielded.
    pub fn path_to(&self, goal: SpaceTime) -> Vec<SpaceTime> {
        let mut path = Vec::new();
        let mut cursor = goal;
        while cursor != self.start {
            path.push(cursor);
            match self.parents.get(&cursor) {
                Some(&parent) => cursor = parent,
                None => break,
            }
        }
        path.reverse();
        path
    }

    fn expand(&mut self) {
        let t = self.layer_t + 1;
        let grid = self.reach.board.grid();
        let mut seen = HashSet::new();
        let mut next = Vec::new();
        for &from in &self.layer {
            let here = from.position();
            for cell in iter::once(here).chain(grid.neighbors(here)) {
                if seen.contains(&cell) || !self.reach.admissible(cell, t) {
                    continue;
                }
                seen.insert(cell);
                let state = SpaceTime::at(cell, t);
                self.parents.insert(state, from);
                next.push(state);
            }
        }
        self.ready.extend(next.iter().copied());
        self.layer = next;
        self.layer_t = t;
    }
}

impl Iterator for Explore<'_, '_> {
    type Item = SpaceTime;

    fn next(&mut self) -> Option<SpaceTime> {
        loop {
            if let Some(state) = self.ready.pop_front() {
                if !self.started {
                    self.started = true;
                    self.layer.push(state);
                }
                return Some(state);
            }
            if self.layer.is_empty() || self.layer_t >= self.limit {
                return None;
            }
            self.expand();
        }
    }
}
