//! Player actions and the per-game action log.

use serde::{Deserialize, Serialize};

use super::{Position, Side, TowerId};

/// Action category, as named by the submission API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    /// Place a tower.
    Install,
    /// Relocate a tower.
    Move,
    /// Replace a tower's logic.
    ModifyLogic,
    /// Hand the turn over.
    EndTurn,
}

/// A request from a seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    /// Place a new tower at `at`. Offensive towers get the built-in forward
    /// logic.
    Install {
        /// Target cell.
        at: Position,
        /// Offensive tower.
        #[serde(default)]
        projectile: bool,
    },
    /// Move an owned tower.
    Move {
        /// Tower to move.
        tower: TowerId,
        /// Destination.
        to: Position,
    },
    /// Compile `source` and make it the tower's logic.
    ModifyLogic {
        /// Tower to reprogram.
        tower: TowerId,
        /// Logic source text.
        source: String,
    },
    /// End the current turn.
    EndTurn,
}

impl Action {
    /// Category of this action.
    #[must_use]
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Install { .. } => ActionKind::Install,
            Action::Move { .. } => ActionKind::Move,
            Action::ModifyLogic { .. } => ActionKind::ModifyLogic,
            Action::EndTurn => ActionKind::EndTurn,
        }
    }
}

/// One accepted action, as kept in the game's log.
///
/// Logic changes carry their bytecode, so a log can be replayed without
/// a compiler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    /// Acting side.
    pub actor: Side,
    /// Round the action was taken in.
    pub round: u32,
    /// The actor's own turn counter, starting at 0.
    pub own_turn: u32,
    /// Category.
    pub kind: ActionKind,
    /// Tower acted on.
    pub tower: Option<TowerId>,
    /// Position before a move.
    pub old: Option<Position>,
    /// Position after an install or move.
    pub new: Option<Position>,
    /// Offensive flag of an installed tower.
    pub projectile: bool,
    /// Logic source.
    pub source: Option<String>,
    /// Compiled logic.
    pub bytecode: Option<Vec<u8>>,
}

impl ActionRecord {
    pub(super) fn new(actor: Side, round: u32, own_turn: u32, kind: ActionKind) -> Self {
        ActionRecord {
            actor,
            round,
            own_turn,
            kind,
            tower: None,
            old: None,
            new: None,
            projectile: false,
            source: None,
            bytecode: None,
        }
    }
}
