// Allow unwrap and unreadable literals in tests (test code is not production)
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::unreadable_literal))]
//! Rampart: a deterministic turn-based tower-defense engine with
//! player-programmable towers.
//!
//! Two players alternate placing, moving and reprogramming towers. Tower
//! logic is compiled to RV32IM and runs in a metered sandbox once per tick,
//! so every round resolves identically on every machine. Lost games are
//! saved and become the scripted defenders of the next challengers.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │   Engine (store, ledger, clock)     │
//! ├─────────────────────────────────────┤
//! │   Game: turns, board, action log    │
//! ├─────────────────────────────────────┤
//! │   Round resolution (rayon + sweep)  │
//! ├─────────────────────────────────────┤
//! │   Logic registry → RV32IM VM        │
//! └─────────────────────────────────────┘
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod game;
pub mod gateway;
pub mod isa;
pub mod ledger;
pub mod logic;
pub mod sim;
pub mod vm;

pub use error::{AccessType, ActionError, ErrorKind, TrapCause, VmResult};

// Re-export key types at crate root for convenience
pub use config::{EngineConfig, Profile};
pub use engine::{Engine, GameView, Opponent};
pub use game::{Action, ActionKind, Board, Game, GameId, PlayerId, Position, Side, TowerId};
pub use gateway::{CompilationGateway, CompileError, ScriptGateway, TimedGateway};
pub use ledger::{LedgerUpdate, ProgressionLedger, SavedGame};
pub use logic::{LogicRegistry, TrajectoryLogic};
pub use sim::{DamageEvent, RoundReport, resolve_round};
