//! Trajectory computation for a single tower.

use serde::Serialize;

use crate::game::{Position, Side, TowerId};
use crate::logic::{InvalidReason, LogicStep, TrajectoryLogic};

/// Positions of one tower's projectile over a round.
///
/// `positions[i]` is the position at tick `i + 1`; tick 0 is `origin`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Trajectory {
    /// Firing tower.
    pub tower: TowerId,
    /// Its owner.
    pub owner: Side,
    /// The tower's cell.
    pub origin: Position,
    /// Computed positions, possibly cut short by invalid logic.
    pub positions: Vec<Position>,
    /// Tick and cause of the first invalid step, if any.
    pub invalid: Option<(u32, InvalidReason)>,
    /// Fuel the logic burned.
    pub fuel_used: u64,
}

impl Trajectory {
    /// True when every tick produced a legal position.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.invalid.is_none()
    }

    /// Position at `tick` (1-based).
    #[must_use]
    pub fn at(&self, tick: u32) -> Option<Position> {
        let index = usize::try_from(tick.checked_sub(1)?).ok()?;
        self.positions.get(index).copied()
    }
}

/// Drive `logic` for `ticks` ticks from `origin`.
///
/// Steps whose Chebyshev length exceeds `max_step` end the trajectory as
/// invalid rather than being clamped.
pub fn compute_trajectory<L: TrajectoryLogic>(
    logic: &mut L,
    tower: TowerId,
    owner: Side,
    origin: Position,
    ticks: u32,
    max_step: u16,
) -> Trajectory {
    let mut positions = Vec::with_capacity(usize::try_from(ticks).unwrap_or_default());
    let mut invalid = None;
    let mut current = origin;
    for tick in 1..=ticks {
        let next = match logic.next_position(tick, current) {
            LogicStep::Next(next) if next.chebyshev(current) <= u32::from(max_step) => next,
            LogicStep::Next(next) => {
                invalid = Some((
                    tick,
                    InvalidReason::StepTooLong {
                        from: current,
                        to: next,
                    },
                ));
                break;
            }
            LogicStep::Invalid(reason) => {
                invalid = Some((tick, reason));
                break;
            }
        };
        positions.push(next);
        current = next;
    }
    Trajectory {
        tower,
        owner,
        origin,
        positions,
        invalid,
        fuel_used: logic.fuel_used(),
    }
}
