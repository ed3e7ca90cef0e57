//! Scripted challengers.
//!
//! A script lists the actions of each of the challenger's turns:
//!
//! ```json
//! {
//!   "player": "0xa11ce",
//!   "username": "alice",
//!   "turns": [
//!     [ { "kind": "install", "at": { "x": 1, "y": 3 }, "projectile": true } ],
//!     [ { "kind": "modify_logic", "tower": 0, "source": "x = x + 1; y = y + (t % 2)" } ]
//!   ]
//! }
//! ```
//!
//! Towers are named by their index among the challenger's own installs.

use super::CliError;
use rampart::engine::SeatView;
use rampart::game::Phase;
use rampart::{Action, Engine, GameId, Opponent, PlayerId, Position, Side, TowerId};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// A challenger's scripted game.
#[derive(Debug, Clone, Deserialize)]
pub(super) struct ChallengerScript {
    /// Player address.
    pub(super) player: String,
    /// Username to register first.
    #[serde(default)]
    pub(super) username: Option<String>,
    /// Actions per turn; each turn ends after its actions.
    pub(super) turns: Vec<Vec<ScriptAction>>,
}

/// One scripted action.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(super) enum ScriptAction {
    /// Place a tower.
    Install {
        /// Target cell.
        at: Position,
        /// Offensive tower.
        #[serde(default)]
        projectile: bool,
    },
    /// Move the n-th installed tower.
    Move {
        /// Install index.
        tower: usize,
        /// Destination.
        to: Position,
    },
    /// Reprogram the n-th installed tower.
    ModifyLogic {
        /// Install index.
        tower: usize,
        /// Logic source.
        source: String,
    },
}

impl ChallengerScript {
    /// Read a script file.
    pub(super) fn load(path: &Path) -> Result<Self, CliError> {
        let json = fs::read_to_string(path)
            .map_err(|e| CliError::new(format!("Failed to read {}: {e}", path.display())))?;
        serde_json::from_str(&json)
            .map_err(|e| CliError::new(format!("Invalid script {}: {e}", path.display())))
    }
}

/// How a scripted game went.
#[derive(Debug, Clone, Serialize)]
pub(super) struct GameSummary {
    /// Challenger address.
    pub(super) player: PlayerId,
    /// Game played.
    pub(super) game: GameId,
    /// Ladder level.
    pub(super) level: u32,
    /// Defender.
    pub(super) opponent: SeatView,
    /// Winner, if the game finished.
    pub(super) winner: Option<Side>,
    /// Completed rounds.
    pub(super) rounds: u32,
    /// Castle health, player 1 first.
    pub(super) castles: [u8; 2],
    /// Rejected actions with their reasons.
    pub(super) rejected: Vec<String>,
    /// Streak after the game.
    pub(super) streak: u32,
}

impl GameSummary {
    /// True when the game reached an end.
    pub(super) fn finished(&self) -> bool {
        self.winner.is_some()
    }
}

/// Play `script` against the ladder on `engine`.
pub(super) fn run_script(engine: &Engine, script: &ChallengerScript) -> Result<GameSummary, CliError> {
    let player = PlayerId::new(script.player.as_str());
    if let Some(name) = &script.username {
        engine.register_player(&player, name)?;
    }
    let mut view = engine.create_game(&player, Opponent::Ladder)?;
    let mut towers: Vec<TowerId> = Vec::new();
    let mut rejected = Vec::new();

    for (turn, actions) in script.turns.iter().enumerate() {
        if view.phase == Phase::Ended {
            break;
        }
        for scripted in actions {
            let Some(action) = to_action(scripted, &towers) else {
                rejected.push(format!("turn {turn}: no tower with that index"));
                continue;
            };
            match engine.submit_action(view.id, &player, action) {
                Ok(next) => {
                    if let ScriptAction::Install { at, .. } = scripted {
                        if let Some(tower) = next.board.tower_at(*at) {
                            towers.push(tower.id);
                        }
                    }
                    view = next;
                }
                Err(err) => rejected.push(format!("turn {turn}: {err}")),
            }
        }
        match engine.submit_action(view.id, &player, Action::EndTurn) {
            Ok(next) => view = next,
            Err(err) => {
                rejected.push(format!("turn {turn}: {err}"));
                break;
            }
        }
    }

    let castles = view.board.castles();
    Ok(GameSummary {
        player: player.clone(),
        game: view.id,
        level: view.level,
        opponent: view.player2.clone(),
        winner: view.winner,
        rounds: view.round_count,
        castles: [castles[0].health, castles[1].health],
        rejected,
        streak: engine.ledger().read(|l| l.streak(&player)),
    })
}

fn to_action(scripted: &ScriptAction, towers: &[TowerId]) -> Option<Action> {
    Some(match scripted {
        ScriptAction::Install { at, projectile } => Action::Install {
            at: *at,
            projectile: *projectile,
        },
        ScriptAction::Move { tower, to } => Action::Move {
            tower: *towers.get(*tower)?,
            to: *to,
        },
        ScriptAction::ModifyLogic { tower, source } => Action::ModifyLogic {
            tower: *towers.get(*tower)?,
            source: source.clone(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_script() {
        let json = r#"{
            "player": "0xa11ce",
            "turns": [
                [ { "kind": "install", "at": { "x": 1, "y": 3 }, "projectile": true } ],
                [ { "kind": "move", "tower": 0, "to": { "x": 2, "y": 3 } } ]
            ]
        }"#;
        let script: ChallengerScript = serde_json::from_str(json).unwrap();
        assert_eq!(script.username, None);
        assert_eq!(script.turns.len(), 2);
        assert!(matches!(
            script.turns[0][0],
            ScriptAction::Install { projectile: true, .. }
        ));
    }

    #[test]
    fn test_towers_by_install_index() {
        let towers = [TowerId(4), TowerId(9)];
        let scripted = ScriptAction::Move {
            tower: 1,
            to: Position::new(2, 2),
        };
        assert_eq!(
            to_action(&scripted, &towers),
            Some(Action::Move {
                tower: TowerId(9),
                to: Position::new(2, 2)
            })
        );
        let missing = ScriptAction::ModifyLogic {
            tower: 2,
            source: "x = x + 1".into(),
        };
        assert_eq!(to_action(&missing, &towers), None);
    }
}
