//! Game layer.
//!
//! - Board with castles and towers
//! - Actions and the action log
//! - Turn state machine driving round resolution
//! - Ghost player replaying saved games

mod action;
mod board;
mod ghost;
mod state;

pub use action::{Action, ActionKind, ActionRecord};
pub use board::{Board, Castle, PlacementIssue, Position, Side, Target, Tower, TowerId};
pub use ghost::GhostPlayer;
pub use state::{Game, GameId, Phase, PlayerId, Seat, TurnOutcome};
