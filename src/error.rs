//! Error types: VM traps and rejected player actions.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::game::{GameId, PlacementIssue, PlayerId, Position, Side, TowerId};

/// Memory access type for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AccessType {
    /// Load instructions.
    Read,
    /// Store instructions.
    Write,
    /// Instruction fetch.
    Execute,
}

/// Trap causes that halt tower logic execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrapCause {
    /// Environment call (ecall instruction).
    Ecall,
    /// Breakpoint (ebreak instruction).
    Ebreak,
    /// Invalid or unimplemented instruction.
    InvalidInstruction(u32),
    /// Memory access outside the logic image.
    MemoryFault {
        /// The address that caused the fault.
        addr: u32,
        /// The type of access attempted.
        access: AccessType,
    },
    /// Instruction address misaligned.
    InstructionMisaligned(u32),
}

impl fmt::Display for TrapCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrapCause::Ecall => write!(f, "environment call"),
            TrapCause::Ebreak => write!(f, "breakpoint"),
            TrapCause::InvalidInstruction(word) => {
                write!(f, "invalid instruction: {word:#010x}")
            }
            TrapCause::MemoryFault { addr, access } => {
                write!(f, "memory {access:?} fault at {addr:#010x}")
            }
            TrapCause::InstructionMisaligned(addr) => {
                write!(f, "instruction address misaligned: {addr:#010x}")
            }
        }
    }
}

impl std::error::Error for TrapCause {}

/// Result type for VM execution steps.
pub type VmResult<T> = Result<T, TrapCause>;

/// Machine-readable category of a rejected action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// Actor is not the side whose turn it is.
    OutOfTurn,
    /// The per-turn action budget is already spent.
    ActionBudgetExceeded,
    /// A turn was ended before any action was taken.
    EndTurnWithoutAction,
    /// Target cell is occupied, off-grid or in the wrong half.
    IllegalPlacement,
    /// The referenced tower is not live or not owned by the actor.
    NoActiveTower,
    /// The gateway rejected the source or produced an unusable image.
    CompileFailure,
    /// Compiled logic exceeds the tower's size limit.
    SizeLimitExceeded,
    /// The gateway did not answer in time.
    GatewayTimeout,
    /// Round resolution exceeded its iteration cap.
    RoundResolutionOverrun,
    /// The game is already over.
    GameEnded,
    /// No game exists with the given id.
    UnknownGame,
    /// The actor is not seated in the game.
    NotAParticipant,
    /// The requested username belongs to someone else.
    UsernameTaken,
    /// The player already has an unfinished game.
    ActiveGameExists,
    /// A player tried to challenge themselves.
    SelfOpponent,
    /// The game store failed; nothing was written.
    Storage,
}

/// A rejected action. `Display` is the human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    /// Acting outside of one's turn.
    #[error("it is {expected}'s turn, {actor} cannot act")]
    OutOfTurn {
        /// Side that tried to act.
        actor: Side,
        /// Side whose turn it is.
        expected: Side,
    },

    /// A second action in the same turn.
    #[error("only {budget} action(s) allowed per turn")]
    ActionBudgetExceeded {
        /// Actions allowed per turn.
        budget: u8,
    },

    /// Ending a turn with no action taken.
    #[error("take an action before ending the turn")]
    EndTurnWithoutAction,

    /// Install or move to a forbidden cell.
    #[error("cannot place a tower at {at}: {issue}")]
    IllegalPlacement {
        /// Requested cell.
        at: Position,
        /// What made it illegal.
        issue: PlacementIssue,
    },

    /// Move or modify of a tower that is gone or belongs to the other side.
    #[error("{tower} is not an active tower of {side}")]
    NoActiveTower {
        /// Referenced tower.
        tower: TowerId,
        /// Acting side.
        side: Side,
    },

    /// The gateway rejected the source.
    #[error("logic failed to compile: {0}")]
    CompileFailure(String),

    /// The compiled image is too large.
    #[error("compiled logic is {size} bytes, the limit is {limit}")]
    SizeLimitExceeded {
        /// Size of the compiled image.
        size: usize,
        /// Tower size limit.
        limit: usize,
    },

    /// The gateway timed out.
    #[error("compilation gateway gave no answer within {0:?}")]
    GatewayTimeout(Duration),

    /// Resolution burned through the round-wide fuel cap.
    #[error("round resolution needed {used} fuel, the cap is {cap}")]
    RoundResolutionOverrun {
        /// Fuel consumed when the cap was hit.
        used: u64,
        /// Round-wide cap.
        cap: u64,
    },

    /// Any action on a finished game.
    #[error("{0} has ended")]
    GameEnded(GameId),

    /// Unknown game id.
    #[error("no such game: {0}")]
    UnknownGame(GameId),

    /// The actor is not one of the game's players.
    #[error("{player} is not seated in {game}")]
    NotAParticipant {
        /// The acting player.
        player: PlayerId,
        /// The game addressed.
        game: GameId,
    },

    /// Username already registered by another player.
    #[error("username {0:?} is already taken")]
    UsernameTaken(String),

    /// Player still has an unfinished game.
    #[error("{player} is still playing {game}")]
    ActiveGameExists {
        /// The player.
        player: PlayerId,
        /// Their unfinished game.
        game: GameId,
    },

    /// Both seats of a human game name the same player.
    #[error("{0} cannot play against themselves")]
    SelfOpponent(PlayerId),

    /// Game store failure.
    #[error("storage failure: {0}")]
    Storage(String),
}

impl ActionError {
    /// Category of this rejection.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            ActionError::OutOfTurn { .. } => ErrorKind::OutOfTurn,
            ActionError::ActionBudgetExceeded { .. } => ErrorKind::ActionBudgetExceeded,
            ActionError::EndTurnWithoutAction => ErrorKind::EndTurnWithoutAction,
            ActionError::IllegalPlacement { .. } => ErrorKind::IllegalPlacement,
            ActionError::NoActiveTower { .. } => ErrorKind::NoActiveTower,
            ActionError::CompileFailure(_) => ErrorKind::CompileFailure,
            ActionError::SizeLimitExceeded { .. } => ErrorKind::SizeLimitExceeded,
            ActionError::GatewayTimeout(_) => ErrorKind::GatewayTimeout,
            ActionError::RoundResolutionOverrun { .. } => ErrorKind::RoundResolutionOverrun,
            ActionError::GameEnded(_) => ErrorKind::GameEnded,
            ActionError::UnknownGame(_) => ErrorKind::UnknownGame,
            ActionError::NotAParticipant { .. } => ErrorKind::NotAParticipant,
            ActionError::UsernameTaken(_) => ErrorKind::UsernameTaken,
            ActionError::ActiveGameExists { .. } => ErrorKind::ActiveGameExists,
            ActionError::SelfOpponent(_) => ErrorKind::SelfOpponent,
            ActionError::Storage(_) => ErrorKind::Storage,
        }
    }
}
