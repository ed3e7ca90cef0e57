//! Scripted defender replaying a saved game.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::ActionError;
use crate::ledger::{SavedGame, SavedGameId};

use super::action::{ActionKind, ActionRecord};
use super::board::{Side, TowerId};
use super::state::{Game, TurnOutcome};

/// Replays player 1's actions of a saved game from player 2's seat.
///
/// Turn `n` of the ghost replays what the recorded player did on their own
/// turn `n`, mirrored into the other half. Entries that are no longer legal
/// are skipped. Once the log runs out the ghost just ends its turns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GhostPlayer {
    saved: Option<SavedGameId>,
    turns: BTreeMap<u32, Vec<ActionRecord>>,
    next_turn: u32,
    towers: BTreeMap<TowerId, TowerId>,
}

impl GhostPlayer {
    /// A ghost with nothing to replay.
    #[must_use]
    pub fn empty() -> Self {
        GhostPlayer::default()
    }

    /// A ghost replaying `saved`.
    #[must_use]
    pub fn from_saved(saved: &SavedGame) -> Self {
        let mut ghost = GhostPlayer::from_log(&saved.actions);
        ghost.saved = Some(saved.id);
        ghost
    }

    /// A ghost replaying the player 1 entries of `log`.
    #[must_use]
    pub fn from_log(log: &[ActionRecord]) -> Self {
        let mut turns: BTreeMap<u32, Vec<ActionRecord>> = BTreeMap::new();
        for record in log
            .iter()
            .filter(|r| r.actor == Side::Player1 && r.kind != ActionKind::EndTurn)
        {
            turns.entry(record.own_turn).or_default().push(record.clone());
        }
        GhostPlayer {
            saved: None,
            turns,
            next_turn: 0,
            towers: BTreeMap::new(),
        }
    }

    /// The saved game being replayed.
    #[must_use]
    pub fn saved(&self) -> Option<SavedGameId> {
        self.saved
    }

    /// True once every recorded turn has been played.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.turns
            .last_key_value()
            .is_none_or(|(last, _)| self.next_turn > *last)
    }

    /// Rewind to the first turn for a new game.
    pub fn restart(&mut self) {
        self.next_turn = 0;
        self.towers.clear();
    }

    /// Replay this turn's actions into `game`, then end the turn.
    ///
    /// # Errors
    ///
    /// Errors from `EndTurn`; errors of individual replayed actions are
    /// logged and skipped.
    pub fn play_turn(&mut self, game: &mut Game, now: u64) -> Result<TurnOutcome, ActionError> {
        let side = game.turn();
        let records = self.turns.get(&self.next_turn).cloned().unwrap_or_default();
        for record in &records {
            if let Err(err) = self.replay(game, side, record) {
                debug!(game = %game.id(), kind = ?record.kind, %err, "ghost skipped action");
            }
        }
        self.next_turn += 1;
        game.end_turn(side, now)
    }

    fn replay(
        &mut self,
        game: &mut Game,
        side: Side,
        record: &ActionRecord,
    ) -> Result<(), ActionError> {
        let width = game.board().width();
        let mapped = record.tower.and_then(|t| self.towers.get(&t).copied());
        let missing = |tower: Option<TowerId>| ActionError::NoActiveTower {
            tower: tower.unwrap_or(TowerId(u32::MAX)),
            side,
        };
        match record.kind {
            ActionKind::Install => {
                let at = record.new.ok_or_else(|| missing(record.tower))?;
                let id = game.install(side, at.mirrored(width), record.projectile)?;
                if let Some(original) = record.tower {
                    self.towers.insert(original, id);
                }
            }
            ActionKind::Move => {
                let tower = mapped.ok_or_else(|| missing(record.tower))?;
                let to = record.new.ok_or_else(|| missing(record.tower))?;
                game.move_tower(side, tower, to.mirrored(width))?;
            }
            ActionKind::ModifyLogic => {
                let tower = mapped.ok_or_else(|| missing(record.tower))?;
                let (Some(source), Some(bytecode)) = (&record.source, &record.bytecode) else {
                    return Err(missing(record.tower));
                };
                game.replay_logic(side, tower, source, bytecode.clone())?;
            }
            ActionKind::EndTurn => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::EngineConfig;
    use crate::game::{GameId, PlayerId, Position, Seat};
    use crate::gateway::compile_script;

    fn recorded_log() -> Vec<ActionRecord> {
        let rules = Arc::new(EngineConfig::default());
        let mut game = Game::new(
            GameId(1),
            PlayerId::new("p1"),
            Seat::Human(PlayerId::new("p2")),
            0,
            rules,
            0,
        );
        let id = game.install(Side::Player1, Position::new(2, 1), true).unwrap();
        game.end_turn(Side::Player1, 1).unwrap();
        game.install(Side::Player2, Position::new(12, 6), false).unwrap();
        game.end_turn(Side::Player2, 2).unwrap();
        let source = "y = y + 1";
        game.replay_logic(Side::Player1, id, source, compile_script(source).unwrap())
            .unwrap();
        game.end_turn(Side::Player1, 3).unwrap();
        game.log().to_vec()
    }

    fn ghost_game(ghost: GhostPlayer) -> Game {
        Game::new(
            GameId(2),
            PlayerId::new("challenger"),
            Seat::Ghost(ghost),
            0,
            Arc::new(EngineConfig::default()),
            0,
        )
    }

    #[test]
    fn test_ghost_mirrors_recorded_actions() {
        let mut game = ghost_game(GhostPlayer::from_log(&recorded_log()));
        game.end_turn(Side::Player1, 1).unwrap();
        game.play_ghost_turn(2).unwrap().unwrap();
        let tower = game.board().tower_at(Position::new(11, 1)).copied().unwrap();
        assert_eq!(tower.owner, Side::Player2);
        assert!(tower.projectile);

        game.install(Side::Player1, Position::new(0, 0), false).unwrap();
        game.end_turn(Side::Player1, 3).unwrap();
        game.play_ghost_turn(4).unwrap().unwrap();
        assert_eq!(game.logic().get(tower.id).unwrap().source(), "y = y + 1");

        let Seat::Ghost(ghost) = game.player2() else {
            panic!("ghost seat expected");
        };
        assert!(ghost.is_exhausted());
    }

    #[test]
    fn test_ghost_skips_illegal_entries() {
        let mut game = ghost_game(GhostPlayer::from_log(&recorded_log()));
        game.install(Side::Player1, Position::new(3, 3), false).unwrap();
        game.end_turn(Side::Player1, 1).unwrap();
        // Mirrors onto player 1's castle.
        let mut log = recorded_log();
        log[0].new = Some(Position::new(13, 3));
        let mut blocked = GhostPlayer::from_log(&log);
        let outcome = blocked.play_turn(&mut game, 2).unwrap();
        assert_eq!(outcome.path.last(), Some(&crate::game::Phase::AwaitingPlayer1));
        assert_eq!(game.board().towers().count(), 1);
    }

    #[test]
    fn test_exhausted_ghost_passes() {
        let mut game = ghost_game(GhostPlayer::empty());
        game.end_turn(Side::Player1, 1).unwrap();
        let outcome = game.play_ghost_turn(2).unwrap().unwrap();
        assert!(outcome.resolved);
        assert_eq!(game.round_count(), 1);
        assert_eq!(game.play_ghost_turn(3).unwrap(), None);
    }

    #[test]
    fn test_restart_rewinds() {
        let mut ghost = GhostPlayer::from_log(&recorded_log());
        let mut game = ghost_game(GhostPlayer::empty());
        game.end_turn(Side::Player1, 1).unwrap();
        ghost.play_turn(&mut game, 2).unwrap();
        assert!(!ghost.is_exhausted());
        ghost.restart();
        assert_eq!(ghost.next_turn, 0);
        assert!(ghost.towers.is_empty());
    }
}
