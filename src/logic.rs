//! Tower attack logic: the trajectory contract, program-backed logic and
//! the per-game registry of deployed programs.
//!
//! # Calling convention
//!
//! A program is invoked once per tick with `a0 = tick`, `a1 = x` and
//! `a2 = y` and answers by executing `ecall` with `a7 = 93`, `a0 = next x`
//! and `a1 = next y`. Coordinates are in the owner's frame: player 2 sees the
//! board mirrored, so "forward" is `+x` for both sides.

mod defaults;
mod program;
mod registry;

use serde::Serialize;

use crate::error::TrapCause;
use crate::game::{Position, Side};

pub use defaults::{FORWARD_BYTECODE, FORWARD_SOURCE};
pub use program::VmLogic;
pub use registry::{LogicChanged, LogicError, LogicHandle, LogicRegistry};

/// `a7` value of the return syscall.
pub const SYSCALL_RETURN: u32 = 93;

/// One invocation of tower logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LogicStep {
    /// The projectile's position at this tick.
    Next(Position),
    /// The logic misbehaved; the trajectory ends invalid.
    Invalid(InvalidReason),
}

/// Why logic produced no usable position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InvalidReason {
    /// The program faulted.
    Trap(TrapCause),
    /// The per-invocation fuel ran out.
    OutOfFuel,
    /// The tower's share of the round fuel cap ran out.
    BudgetExhausted,
    /// `ecall` with an unknown `a7`.
    UnknownSyscall(u32),
    /// The returned coordinates do not fit a board coordinate.
    OutOfRange {
        /// Returned x.
        x: i32,
        /// Returned y.
        y: i32,
    },
    /// Moved further in one tick than the step bound allows.
    StepTooLong {
        /// Position before the step.
        from: Position,
        /// Position after the step.
        to: Position,
    },
}

/// The trajectory contract: a pure function from the tick and current
/// position to the next position.
pub trait TrajectoryLogic {
    /// Position at `tick`, given the position at `tick - 1`.
    fn next_position(&mut self, tick: u32, current: Position) -> LogicStep;

    /// Fuel consumed so far.
    fn fuel_used(&self) -> u64 {
        0
    }
}

/// Coordinate frame a side's logic runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    /// Board coordinates.
    Board,
    /// Mirrored across the vertical midline.
    Mirrored {
        /// Board width.
        width: i16,
    },
}

impl Frame {
    /// The frame a side's towers see.
    #[must_use]
    pub fn of(side: Side, width: i16) -> Frame {
        match side {
            Side::Player1 => Frame::Board,
            Side::Player2 => Frame::Mirrored { width },
        }
    }

    /// Board coordinates to this frame. Mirroring is its own inverse, so
    /// this also maps back.
    #[must_use]
    pub fn apply(self, pos: Position) -> Position {
        match self {
            Frame::Board => pos,
            Frame::Mirrored { width } => Position::new((width - 1).saturating_sub(pos.x), pos.y),
        }
    }
}
