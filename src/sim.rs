//! Round resolution.
//!
//! A round runs in two phases:
//! - Every tower holding logic computes its trajectory, in parallel with rayon
//! - A sequential sweep walks the ticks in order and decides collisions
//!
//! The board is read-only throughout; the caller applies the resulting
//! [`DamageEvent`]s in one step.

mod sweep;
mod trajectory;

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::error::ActionError;
use crate::game::{Board, Position, TowerId};
use crate::logic::{Frame, InvalidReason, LogicRegistry, VmLogic};

pub use sweep::{DamageEvent, Fate};
pub use trajectory::{Trajectory, compute_trajectory};

/// Everything one round produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundReport {
    /// Round number the report belongs to.
    pub round: u32,
    /// Ticks simulated.
    pub tick_count: u32,
    /// Trajectory of every firing tower.
    pub trajectories: BTreeMap<TowerId, Trajectory>,
    /// How each projectile ended.
    pub fates: BTreeMap<TowerId, Fate>,
    /// Hits in tick order, then tower id order.
    pub damage: Vec<DamageEvent>,
    /// Fuel burned by all logic together.
    pub fuel_used: u64,
}

impl RoundReport {
    /// Projectiles still in flight at `tick`, for tick-by-tick playback.
    /// Tick 0 shows every valid projectile on its tower.
    #[must_use]
    pub fn frame(&self, tick: u32) -> Vec<(TowerId, Position)> {
        self.trajectories
            .iter()
            .filter(|(id, traj)| {
                traj.is_valid()
                    && self
                        .fates
                        .get(id)
                        .is_some_and(|fate| tick <= fate.last_visible_tick(self.tick_count))
            })
            .filter_map(|(id, traj)| {
                let pos = if tick == 0 { Some(traj.origin) } else { traj.at(tick) };
                pos.map(|p| (*id, p))
            })
            .collect()
    }

    /// Towers whose logic failed this round.
    pub fn invalid_towers(&self) -> impl Iterator<Item = TowerId> + '_ {
        self.trajectories
            .values()
            .filter(|t| !t.is_valid())
            .map(|t| t.tower)
    }
}

/// Resolution could not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResolutionError {
    /// A tower ran through its share of the round's fuel cap.
    #[error("round used {used} fuel, cap is {cap}")]
    Overrun {
        /// Fuel burned.
        used: u64,
        /// Round cap.
        cap: u64,
    },
}

impl From<ResolutionError> for ActionError {
    fn from(err: ResolutionError) -> Self {
        match err {
            ResolutionError::Overrun { used, cap } => {
                ActionError::RoundResolutionOverrun { used, cap }
            }
        }
    }
}

/// Simulate one round against a snapshot of `board`.
///
/// Every tower with deployed logic fires. Player 2's towers run in the
/// mirrored frame. Invalid logic never aborts the round; the tower just
/// deals no damage.
///
/// # Errors
///
/// [`ResolutionError::Overrun`] when a tower exhausts its share of
/// `round_fuel_cap`. The cap is split evenly among the firing towers, so
/// the round never burns more than the cap. Nothing is returned for the
/// round in that case.
pub fn resolve_round(
    board: &Board,
    logic: &LogicRegistry,
    rules: &EngineConfig,
    round: u32,
) -> Result<RoundReport, ResolutionError> {
    let sim = &rules.simulation;
    let firing: Vec<_> = board
        .towers()
        .filter_map(|tower| logic.get(tower.id).map(|handle| (*tower, handle)))
        .collect();
    let share = sim.round_fuel_cap / u64::try_from(firing.len().max(1)).unwrap_or(u64::MAX);

    let trajectories: BTreeMap<TowerId, Trajectory> = firing
        .into_par_iter()
        .map(|(tower, handle)| {
            let frame = Frame::of(tower.owner, board.width());
            let mut vm = VmLogic::new(handle.program(), frame, sim).with_budget(share);
            let traj = compute_trajectory(
                &mut vm,
                tower.id,
                tower.owner,
                tower.position,
                sim.tick_count,
                sim.max_step,
            );
            (tower.id, traj)
        })
        .collect();

    let fuel_used: u64 = trajectories.values().map(|t| t.fuel_used).sum();
    let exhausted = trajectories
        .values()
        .filter(|t| matches!(t.invalid, Some((_, InvalidReason::BudgetExhausted))))
        .count();
    if exhausted > 0 {
        warn!(round, fuel_used, cap = sim.round_fuel_cap, exhausted, "round resolution overrun");
        return Err(ResolutionError::Overrun {
            used: fuel_used,
            cap: sim.round_fuel_cap,
        });
    }
    for traj in trajectories.values() {
        if let Some((tick, reason)) = &traj.invalid {
            warn!(tower = %traj.tower, tick, ?reason, "invalid tower logic");
        }
    }

    let swept = sweep::sweep(
        board,
        &trajectories,
        sim.tick_count,
        sim.collision_radius,
        rules.health.damage,
    );
    info!(
        round,
        projectiles = trajectories.len(),
        hits = swept.damage.len(),
        fuel_used,
        "round resolved"
    );
    Ok(RoundReport {
        round,
        tick_count: sim.tick_count,
        trajectories,
        fates: swept.fates,
        damage: swept.damage,
        fuel_used,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{Side, Target};
    use crate::gateway::compile_script;

    fn rules(ticks: u32) -> EngineConfig {
        let mut rules = EngineConfig::default();
        rules.simulation.tick_count = ticks;
        rules
    }

    fn setup(rules: &EngineConfig) -> (Board, LogicRegistry) {
        let board = Board::new(&rules.board, &rules.health);
        let logic = LogicRegistry::new(rules.logic.size_limit, rules.simulation.memory_size);
        (board, logic)
    }

    fn script(logic: &mut LogicRegistry, tower: TowerId, source: &str) {
        let bytes = compile_script(source).unwrap();
        logic.install_bytecode(tower, source, bytes).unwrap();
    }

    #[test]
    fn test_defensive_towers_do_not_fire() {
        let rules = rules(28);
        let (mut board, logic) = setup(&rules);
        board.install(Side::Player1, Position::new(2, 2), false).unwrap();
        let report = resolve_round(&board, &logic, &rules, 0).unwrap();
        assert!(report.trajectories.is_empty());
        assert!(report.damage.is_empty());
    }

    #[test]
    fn test_forward_shot_hits_castle() {
        let rules = rules(28);
        let (mut board, mut logic) = setup(&rules);
        let id = board.install(Side::Player1, Position::new(1, 3), true).unwrap();
        logic.install_default(id).unwrap();
        let report = resolve_round(&board, &logic, &rules, 0).unwrap();
        assert_eq!(
            report.damage,
            vec![DamageEvent {
                tick: 12,
                source: id,
                target: Target::Castle(Side::Player2),
                amount: 1,
            }]
        );
        assert_eq!(
            report.fates[&id],
            Fate::Hit {
                tick: 12,
                target: Target::Castle(Side::Player2)
            }
        );
    }

    #[test]
    fn test_player2_shoots_left() {
        let rules = rules(28);
        let (mut board, mut logic) = setup(&rules);
        let id = board.install(Side::Player2, Position::new(12, 3), true).unwrap();
        logic.install_default(id).unwrap();
        let report = resolve_round(&board, &logic, &rules, 0).unwrap();
        assert_eq!(report.trajectories[&id].at(1), Some(Position::new(11, 3)));
        assert_eq!(report.damage[0].target, Target::Castle(Side::Player1));
        assert_eq!(report.damage[0].tick, 12);
    }

    #[test]
    fn test_head_on_projectiles_intercept() {
        let rules = rules(28);
        let (mut board, mut logic) = setup(&rules);
        let a = board.install(Side::Player1, Position::new(2, 1), true).unwrap();
        let b = board.install(Side::Player2, Position::new(12, 1), true).unwrap();
        script(&mut logic, a, "x = x + 1");
        script(&mut logic, b, "x = x + 1");
        let report = resolve_round(&board, &logic, &rules, 0).unwrap();
        // Both reach (7, 1) at tick 5.
        assert!(report.damage.is_empty());
        assert_eq!(report.fates[&a], Fate::Intercepted { tick: 5 });
        assert_eq!(report.fates[&b], Fate::Intercepted { tick: 5 });
    }

    #[test]
    fn test_off_board_and_expired() {
        let rules = rules(5);
        let (mut board, mut logic) = setup(&rules);
        let up = board.install(Side::Player1, Position::new(3, 1), true).unwrap();
        let idle = board.install(Side::Player1, Position::new(4, 5), true).unwrap();
        script(&mut logic, up, "y = y - 1");
        script(&mut logic, idle, "y = 6");
        let report = resolve_round(&board, &logic, &rules, 0).unwrap();
        assert_eq!(report.fates[&up], Fate::OffBoard { tick: 2 });
        assert_eq!(report.fates[&idle], Fate::Expired);
        assert_eq!(report.frame(2), vec![(idle, Position::new(4, 6))]);
        assert_eq!(report.frame(1).len(), 2);
    }

    #[test]
    fn test_invalid_logic_deals_no_damage() {
        let rules = rules(28);
        let (mut board, mut logic) = setup(&rules);
        let id = board.install(Side::Player1, Position::new(1, 3), true).unwrap();
        script(&mut logic, id, "x = x + 3");
        let report = resolve_round(&board, &logic, &rules, 0).unwrap();
        assert!(report.damage.is_empty());
        assert_eq!(report.fates[&id], Fate::Invalid { tick: 1 });
        assert_eq!(report.invalid_towers().collect::<Vec<_>>(), vec![id]);
        assert!(report.frame(0).is_empty());
    }

    #[test]
    fn test_overrun_is_reported() {
        let mut rules = rules(28);
        rules.simulation.fuel_per_tick = 100;
        rules.simulation.round_fuel_cap = 100;
        let (mut board, mut logic) = setup(&rules);
        let id = board.install(Side::Player1, Position::new(1, 0), true).unwrap();
        logic.install_default(id).unwrap();
        let err = resolve_round(&board, &logic, &rules, 0).unwrap_err();
        assert_eq!(err, ResolutionError::Overrun { used: 100, cap: 100 });
        assert_eq!(
            ActionError::from(err).kind(),
            crate::error::ErrorKind::RoundResolutionOverrun
        );
    }

    #[test]
    fn test_friendly_tower_blocks_shot() {
        let rules = rules(28);
        let (mut board, mut logic) = setup(&rules);
        let shooter = board.install(Side::Player1, Position::new(1, 3), true).unwrap();
        let wall = board.install(Side::Player1, Position::new(4, 3), false).unwrap();
        logic.install_default(shooter).unwrap();
        let report = resolve_round(&board, &logic, &rules, 0).unwrap();
        assert_eq!(report.damage.len(), 1);
        assert_eq!(report.damage[0].target, Target::Tower(wall));
        assert_eq!(report.damage[0].tick, 3);
    }

    #[test]
    fn test_fuel_cap_bounds_work_across_towers() {
        let mut rules = rules(28);
        rules.simulation.round_fuel_cap = 10_000;
        let (mut board, mut logic) = setup(&rules);
        let heavy = format!("x = x + 1{}", " + t - t".repeat(20));
        for y in 0..7 {
            for x in [2, 4] {
                let id = board.install(Side::Player1, Position::new(x, y), true).unwrap();
                script(&mut logic, id, &heavy);
            }
        }
        let first = resolve_round(&board, &logic, &rules, 0).unwrap_err();
        let ResolutionError::Overrun { used, cap } = first;
        assert_eq!(cap, 10_000);
        assert!(used <= cap, "{used} > {cap}");
        assert_eq!(resolve_round(&board, &logic, &rules, 0).unwrap_err(), first);
    }
}
