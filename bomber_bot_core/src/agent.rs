use std::collections::HashSet;

use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    Action, Bomb, EntityId, Player, Position,
    board::Snapshot,
    chain,
    search::{Reachability, SearchOutcome, SpaceTime, default_horizon},
};

/// Trait defining the behavior of an agent.
/// Agents decide which action to take based on the turn snapshot.
pub trait Agent {
    /// Returns the id the game server gave this agent.
    fn id(&self) -> EntityId;

    /// Determines the action for this turn.
    fn act(&mut self, snapshot: &Snapshot) -> Action;
}

/// Tunables of the decision engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Countdown of a freshly placed bomb.
    pub placement_fuse: usize,
    /// How many turns ahead items are looked for.
    pub item_search_depth: usize,
    /// Turns explored by every other search. `None` uses the arena's largest dimension.
    pub horizon: Option<usize>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            placement_fuse: 8,
            item_search_depth: 10,
            horizon: None,
        }
    }
}

/// What the agent is working toward this turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Plan {
    CollectItem(Position),
    PlaceBomb { at: Position, destroys: usize },
    Retreat(Position),
    Hold,
}

/// How the plan was weakened to survive opponents' worst-case bombs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Fallback {
    DropPlacement,
    StayAndPlace,
    Stay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Verified,
    Degraded(Fallback),
    /// Nothing survives the worst case; the original plan is played anyway.
    Doomed,
}

/// Outcome of one turn of deliberation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub plan: Plan,
    pub destination: Position,
    pub next_step: Position,
    pub place_bomb: bool,
    pub verdict: Verdict,
    /// Planned steps, next one first.
    pub path: Vec<SpaceTime>,
}

impl Decision {
    pub fn action(&self) -> Action {
        if self.place_bomb {
            Action::Bomb(self.next_step)
        } else {
            Action::Move(self.next_step)
        }
    }
}

/// Agent that plans against bombs going off over the next turns.
#[derive(Debug)]
pub struct HazardAwareAgent {
    id: EntityId,
    config: AgentConfig,
}

impl HazardAwareAgent {
    pub fn new(id: EntityId, config: AgentConfig) -> Self {
        Self { id, config }
    }

    fn horizon(&self, snapshot: &Snapshot) -> usize {
        self.config
            .horizon
            .unwrap_or_else(|| default_horizon(snapshot.board()))
    }

    fn reachability<'s>(&self, snapshot: &'s Snapshot, bombs: &[Bomb]) -> Reachability<'s> {
        Reachability::new(
            snapshot.board(),
            snapshot.items(),
            bombs,
            self.horizon(snapshot),
        )
    }

    /// A bomb `player` would place on `position` at turn `t`.
    fn hypothetical(&self, player: &Player, position: Position, t: usize) -> Bomb {
        Bomb {
            owner: player.id,
            position,
            countdown: t + self.config.placement_fuse,
            range: player.range,
        }
    }

    /// Runs the whole decision for one turn.
    pub fn decide(&self, snapshot: &Snapshot) -> Decision {
        let me = *snapshot.me();
        let reach = self.reachability(snapshot, snapshot.bombs());
        let origin = SpaceTime::at(me.position, 0);
        let budget = snapshot.placement_budget(&me);
        let free_here = snapshot.bomb_at(me.position).is_none();

        let (plan, path) = self
            .pursue_item(snapshot, &reach, origin)
            .or_else(|| {
                if budget > 0 {
                    self.best_placement(snapshot, &reach, origin, &me)
                } else {
                    None
                }
            })
            .or_else(|| self.retreat(&reach, origin))
            .unwrap_or((Plan::Hold, Vec::new()));

        let mut destination = path.last().map_or(me.position, |s| s.position());
        let mut next_step = path.first().map_or(me.position, |s| s.position());
        let mut place_bomb = matches!(plan, Plan::PlaceBomb { at, .. } if at == me.position);

        if !place_bomb && budget > 0 && free_here {
            place_bomb = self.can_place_on_the_way(snapshot, &me, next_step);
        }

        let survives = |step: Position, placing: bool| {
            self.survives_worst_case(snapshot, &me, step, placing)
        };
        let verdict = if survives(next_step, place_bomb) {
            Verdict::Verified
        } else if place_bomb && survives(next_step, false) {
            place_bomb = false;
            Verdict::Degraded(Fallback::DropPlacement)
        } else if place_bomb && survives(me.position, true) {
            next_step = me.position;
            destination = me.position;
            Verdict::Degraded(Fallback::StayAndPlace)
        } else if survives(me.position, false) {
            next_step = me.position;
            destination = me.position;
            place_bomb = false;
            Verdict::Degraded(Fallback::Stay)
        } else {
            Verdict::Doomed
        };

        let path = match verdict {
            Verdict::Degraded(Fallback::StayAndPlace | Fallback::Stay) => Vec::new(),
            _ => path,
        };

        match verdict {
            Verdict::Verified => {}
            Verdict::Degraded(fallback) => {
                warn!(?fallback, ?plan, "worst-case opponents force a weaker move")
            }
            Verdict::Doomed => warn!(?plan, "no move survives the worst case"),
        }

        Decision {
            plan,
            destination,
            next_step,
            place_bomb,
            verdict,
            path,
        }
    }

    /// First item within reach that still leaves a way out afterwards.
    fn pursue_item(
        &self,
        snapshot: &Snapshot,
        reach: &Reachability<'_>,
        origin: SpaceTime,
    ) -> Option<(Plan, Vec<SpaceTime>)> {
        if snapshot.items().is_empty() {
            return None;
        }
        let mut tried = HashSet::new();
        let mut explore = reach.explore_within(origin, self.config.item_search_depth);
        while let Some(state) = explore.next() {
            let cell = state.position();
            if snapshot.item_at(cell).is_none() || !tried.insert(cell) {
                continue;
            }
            if reach.search_safe(state).is_found() {
                debug!(x = cell.x, y = cell.y, t = state.t, "going for item");
                return Some((Plan::CollectItem(cell), explore.path_to(state)));
            }
            debug!(x = cell.x, y = cell.y, "item reachable but no way out from it");
        }
        None
    }

    /// Reachable cell where a bomb destroys the most, provided the agent can get
    /// clear of it afterwards.
    fn best_placement(
        &self,
        snapshot: &Snapshot,
        reach: &Reachability<'_>,
        origin: SpaceTime,
        me: &Player,
    ) -> Option<(Plan, Vec<SpaceTime>)> {
        let mut best: Option<(usize, SpaceTime, Vec<SpaceTime>)> = None;
        let mut seen = HashSet::new();
        let mut explore = reach.explore(origin);
        while let Some(state) = explore.next() {
            let cell = state.position();
            if !seen.insert(cell) || snapshot.bomb_at(cell).is_some() {
                continue;
            }
            let Some((destroys, escape)) = self.placement_value(snapshot, me, state) else {
                continue;
            };
            if best.as_ref().is_none_or(|(score, _, _)| destroys > *score) {
                best = Some((destroys, state, escape));
            }
        }

        let (destroys, state, escape) = best?;
        let at = state.position();
        debug!(x = at.x, y = at.y, destroys, "best bomb spot");
        let path = if state == origin {
            escape
        } else {
            explore.path_to(state)
        };
        Some((Plan::PlaceBomb { at, destroys }, path))
    }

    /// Boxes and items a bomb dropped at `at` would take out, and the escape
    /// from it. `None` when it destroys nothing or traps the agent.
    fn placement_value(
        &self,
        snapshot: &Snapshot,
        me: &Player,
        at: SpaceTime,
    ) -> Option<(usize, Vec<SpaceTime>)> {
        let bomb = self.hypothetical(me, at.position(), at.t);
        let destroys =
            chain::blast_query(snapshot.board(), snapshot.items(), snapshot.bombs(), &bomb).len();
        if destroys == 0 {
            return None;
        }
        let bombs = snapshot.bombs_with(&[bomb]);
        let escape = self.reachability(snapshot, &bombs).search_safe(at).into_path()?;
        Some((destroys, escape))
    }

    fn retreat(
        &self,
        reach: &Reachability<'_>,
        origin: SpaceTime,
    ) -> Option<(Plan, Vec<SpaceTime>)> {
        if reach.is_safe(origin.position()) {
            return None;
        }
        match reach.search_safe(origin) {
            SearchOutcome::Found(path) => {
                let shelter = path.last().map_or(origin.position(), |s| s.position());
                debug!(x = shelter.x, y = shelter.y, "retreating");
                Some((Plan::Retreat(shelter), path))
            }
            SearchOutcome::Exhausted => {
                debug!("in a blast zone with nowhere to run");
                None
            }
        }
    }

    /// Whether dropping a bomb on the current cell while heading to `next_step`
    /// still leaves a way out.
    fn can_place_on_the_way(&self, snapshot: &Snapshot, me: &Player, next_step: Position) -> bool {
        let bomb = self.hypothetical(me, me.position, 0);
        let destroyed =
            chain::blast_query(snapshot.board(), snapshot.items(), snapshot.bombs(), &bomb);
        if destroyed.is_empty() {
            return false;
        }
        let bombs = snapshot.bombs_with(&[bomb]);
        let reach = self.reachability(snapshot, &bombs);
        let start = if next_step == me.position {
            SpaceTime::at(me.position, 0)
        } else {
            SpaceTime::at(next_step, 1)
        };
        reach.search_safe(start).is_found()
    }

    /// Whether stepping to `next_step` (optionally dropping a bomb first) stays
    /// survivable if every opponent able to drops a bomb where it stands.
    fn survives_worst_case(
        &self,
        snapshot: &Snapshot,
        me: &Player,
        next_step: Position,
        placing: bool,
    ) -> bool {
        let mut extra: Vec<Bomb> = snapshot
            .opponents()
            .filter(|p| {
                snapshot.placement_budget(p) > 0 && snapshot.bomb_at(p.position).is_none()
            })
            .map(|p| self.hypothetical(p, p.position, 0))
            .collect();
        if placing {
            extra.push(self.hypothetical(me, me.position, 0));
        }
        let bombs = snapshot.bombs_with(&extra);
        let reach = self.reachability(snapshot, &bombs);
        let enterable = next_step == me.position || reach.admissible(next_step, 1);
        enterable
            && !reach.struck(next_step, 1)
            && reach.search_safe(SpaceTime::at(next_step, 1)).is_found()
    }
}

impl Agent for HazardAwareAgent {
    fn id(&self) -> EntityId {
        self.id
    }

    fn act(&mut self, snapshot: &Snapshot) -> Action {
        let decision = self.decide(snapshot);
        info!(
            plan = ?decision.plan,
            verdict = ?decision.verdict,
            x = decision.next_step.x,
            y = decision.next_step.y,
            bomb = decision.place_bomb,
            "decided"
        );
        decision.action()
    }
}

/// Baseline agent stepping to a random neighbor that is not about to blow up.
#[derive(Debug)]
pub struct RandomWalker {
    id: EntityId,
    rng: StdRng,
}

impl RandomWalker {
    pub fn new(id: EntityId, seed: u64) -> Self {
        Self {
            id,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Agent for RandomWalker {
    fn id(&self) -> EntityId {
        self.id
    }

    fn act(&mut self, snapshot: &Snapshot) -> Action {
        let here = snapshot.me().position;
        let board = snapshot.board();
        let reach = Reachability::new(board, snapshot.items(), snapshot.bombs(), 1);

        let moves: Vec<Position> = std::iter::once(here)
            .chain(board.grid().neighbors(here))
            .filter(|&cell| cell == here || reach.admissible(cell, 1))
            .collect();
        let safe: Vec<Position> = moves
            .iter()
            .copied()
            .filter(|&cell| reach.is_safe(cell))
            .collect();
        let pool = if safe.is_empty() { &moves } else { &safe };

        let target = pool[self.rng.random_range(0..pool.len())];
        Action::Move(target)
    }
}
