//! Tick-by-tick collision sweep over precomputed trajectories.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::game::{Board, Position, Target, TowerId};

use super::Trajectory;

/// How a projectile's round ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Fate {
    /// Struck a castle or tower.
    Hit {
        /// Tick of impact.
        tick: u32,
        /// What was struck.
        target: Target,
    },
    /// Collided with another projectile; neither deals damage.
    Intercepted {
        /// Tick of collision.
        tick: u32,
    },
    /// Left the grid.
    OffBoard {
        /// First tick off the grid.
        tick: u32,
    },
    /// Logic failed; the projectile never flew.
    Invalid {
        /// Tick of the failure.
        tick: u32,
    },
    /// Still flying when the round ran out.
    Expired,
}

impl Fate {
    /// Last tick at which the projectile is drawn.
    #[must_use]
    pub fn last_visible_tick(&self, tick_count: u32) -> u32 {
        match *self {
            Fate::Hit { tick, .. } | Fate::Intercepted { tick } => tick,
            Fate::OffBoard { tick } | Fate::Invalid { tick } => tick.saturating_sub(1),
            Fate::Expired => tick_count,
        }
    }
}

/// Damage dealt by one hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DamageEvent {
    /// Tick of impact.
    pub tick: u32,
    /// Firing tower.
    pub source: TowerId,
    /// What was struck.
    pub target: Target,
    /// Hit points removed.
    pub amount: u8,
}

/// Result of sweeping all trajectories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct Sweep {
    pub(super) fates: BTreeMap<TowerId, Fate>,
    pub(super) damage: Vec<DamageEvent>,
}

/// Walk ticks `1..=tick_count`. At each tick, projectiles off the grid
/// expire, projectiles within `radius` of each other are intercepted
/// together, and each survivor tests the opposing castle and then every
/// other tower in id order. The board is not modified.
pub(super) fn sweep(
    board: &Board,
    trajectories: &BTreeMap<TowerId, Trajectory>,
    tick_count: u32,
    radius: u16,
    damage: u8,
) -> Sweep {
    let radius_sq = i64::from(radius) * i64::from(radius);
    let near = |a: Position, b: Position| a.distance_sq(b) < radius_sq;

    let mut fates = BTreeMap::new();
    let mut events = Vec::new();
    let mut live: BTreeSet<TowerId> = BTreeSet::new();
    for (id, traj) in trajectories {
        match traj.invalid {
            Some((tick, _)) => {
                fates.insert(*id, Fate::Invalid { tick });
            }
            None => {
                live.insert(*id);
            }
        }
    }

    for tick in 1..=tick_count {
        let mut flying: Vec<(TowerId, Position)> = Vec::with_capacity(live.len());
        for id in &live {
            match trajectories[id].at(tick) {
                Some(pos) if board.contains(pos) => flying.push((*id, pos)),
                _ => {
                    fates.insert(*id, Fate::OffBoard { tick });
                }
            }
        }

        let mut intercepted = BTreeSet::new();
        for (i, (a, pa)) in flying.iter().enumerate() {
            for (b, pb) in &flying[i + 1..] {
                if near(*pa, *pb) {
                    intercepted.insert(*a);
                    intercepted.insert(*b);
                }
            }
        }

        for (id, pos) in &flying {
            if intercepted.contains(id) {
                fates.insert(*id, Fate::Intercepted { tick });
                continue;
            }
            let owner = trajectories[id].owner;
            let castle = board.castle(owner.opponent());
            let target = if near(*pos, castle.position) {
                Some(Target::Castle(castle.side))
            } else {
                board
                    .towers()
                    .find(|t| t.id != *id && near(*pos, t.position))
                    .map(|t| Target::Tower(t.id))
            };
            if let Some(target) = target {
                events.push(DamageEvent {
                    tick,
                    source: *id,
                    target,
                    amount: damage,
                });
                fates.insert(*id, Fate::Hit { tick, target });
            }
        }

        live.retain(|id| !fates.contains_key(id));
        if live.is_empty() {
            break;
        }
    }

    for id in live {
        fates.insert(id, Fate::Expired);
    }
    Sweep {
        fates,
        damage: events,
    }
}
