//! Game state and the turn/action state machine.

use std::fmt;
use std::mem;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{EngineConfig, ResolutionSchedule};
use crate::error::ActionError;
use crate::gateway::TimedGateway;
use crate::logic::{LogicChanged, LogicRegistry};
use crate::sim::{RoundReport, resolve_round};

use super::action::{ActionKind, ActionRecord};
use super::board::{Board, Position, Side, Target, TowerId};
use super::ghost::GhostPlayer;

/// Game identity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct GameId(pub u64);

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "game #{}", self.0)
    }
}

/// A player's address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub String);

impl PlayerId {
    /// Wrap an address.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        PlayerId(address.into())
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who sits in the defender's seat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seat {
    /// A human player.
    Human(PlayerId),
    /// A replayed saved game.
    Ghost(GhostPlayer),
}

/// State machine phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Player 1 to act.
    AwaitingPlayer1,
    /// Player 2 to act.
    AwaitingPlayer2,
    /// A round is being resolved.
    Resolving,
    /// Finished.
    Ended,
}

impl Phase {
    fn awaiting(side: Side) -> Phase {
        match side {
            Side::Player1 => Phase::AwaitingPlayer1,
            Side::Player2 => Phase::AwaitingPlayer2,
        }
    }
}

/// What an accepted `EndTurn` did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnOutcome {
    /// Phases passed through, ending in the new phase.
    pub path: Vec<Phase>,
    /// Whether a round was resolved.
    pub resolved: bool,
    /// Targets destroyed by the resolution.
    pub destroyed: Vec<Target>,
    /// Winner, if the game ended.
    pub winner: Option<Side>,
}

/// One game between a challenger and a defender.
///
/// Every mutating method either succeeds or leaves the game untouched.
/// The exception is [`Game::play_ghost_turn`], which callers run on a copy.
#[derive(Debug, Clone)]
pub struct Game {
    id: GameId,
    player1: PlayerId,
    player2: Seat,
    level: u32,
    turn: Side,
    action_count: u8,
    round_count: u32,
    turns_taken: [u32; 2],
    start_timestamp: u64,
    end_timestamp: Option<u64>,
    winner: Option<Side>,
    board: Board,
    logic: LogicRegistry,
    log: Vec<ActionRecord>,
    last_round: Option<RoundReport>,
    rules: Arc<EngineConfig>,
}

impl Game {
    /// A fresh game with player 1 to move.
    #[must_use]
    pub fn new(
        id: GameId,
        player1: PlayerId,
        player2: Seat,
        level: u32,
        rules: Arc<EngineConfig>,
        now: u64,
    ) -> Self {
        Game {
            id,
            player1,
            player2,
            level,
            turn: Side::Player1,
            action_count: 0,
            round_count: 0,
            turns_taken: [0; 2],
            start_timestamp: now,
            end_timestamp: None,
            winner: None,
            board: Board::new(&rules.board, &rules.health),
            logic: LogicRegistry::new(rules.logic.size_limit, rules.simulation.memory_size),
            log: Vec::new(),
            last_round: None,
            rules,
        }
    }

    /// Identity.
    #[must_use]
    pub fn id(&self) -> GameId {
        self.id
    }

    /// The challenger.
    #[must_use]
    pub fn player1(&self) -> &PlayerId {
        &self.player1
    }

    /// The defender's seat.
    #[must_use]
    pub fn player2(&self) -> &Seat {
        &self.player2
    }

    /// Ladder level.
    #[must_use]
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Side to act.
    #[must_use]
    pub fn turn(&self) -> Side {
        self.turn
    }

    /// Actions spent this turn.
    #[must_use]
    pub fn action_count(&self) -> u8 {
        self.action_count
    }

    /// Completed rounds.
    #[must_use]
    pub fn round_count(&self) -> u32 {
        self.round_count
    }

    /// Turns `side` has completed.
    #[must_use]
    pub fn turns_taken(&self, side: Side) -> u32 {
        self.turns_taken[side.index()]
    }

    /// Creation time.
    #[must_use]
    pub fn start_timestamp(&self) -> u64 {
        self.start_timestamp
    }

    /// End time, once ended.
    #[must_use]
    pub fn end_timestamp(&self) -> Option<u64> {
        self.end_timestamp
    }

    /// Winner, once ended.
    #[must_use]
    pub fn winner(&self) -> Option<Side> {
        self.winner
    }

    /// True once the game is over. An ended game never changes again.
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.end_timestamp.is_some()
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        if self.is_ended() {
            Phase::Ended
        } else {
            Phase::awaiting(self.turn)
        }
    }

    /// The board.
    #[must_use]
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Deployed logic.
    #[must_use]
    pub fn logic(&self) -> &LogicRegistry {
        &self.logic
    }

    /// Accepted actions in order.
    #[must_use]
    pub fn log(&self) -> &[ActionRecord] {
        &self.log
    }

    /// Report of the most recent resolution.
    #[must_use]
    pub fn last_round(&self) -> Option<&RoundReport> {
        self.last_round.as_ref()
    }

    /// Rules in force.
    #[must_use]
    pub fn rules(&self) -> &EngineConfig {
        &self.rules
    }

    /// Which side `player` sits on.
    #[must_use]
    pub fn seat_of(&self, player: &PlayerId) -> Option<Side> {
        if *player == self.player1 {
            Some(Side::Player1)
        } else if matches!(&self.player2, Seat::Human(p) if p == player) {
            Some(Side::Player2)
        } else {
            None
        }
    }

    /// True when `side` is played by a ghost.
    #[must_use]
    pub fn is_ghost(&self, side: Side) -> bool {
        side == Side::Player2 && matches!(self.player2, Seat::Ghost(_))
    }

    fn check_turn(&self, actor: Side) -> Result<(), ActionError> {
        if self.is_ended() {
            return Err(ActionError::GameEnded(self.id));
        }
        if actor != self.turn {
            return Err(ActionError::OutOfTurn {
                actor,
                expected: self.turn,
            });
        }
        Ok(())
    }

    fn check_can_act(&self, actor: Side) -> Result<(), ActionError> {
        self.check_turn(actor)?;
        let budget = self.rules.turns.actions_per_turn;
        if self.action_count >= budget {
            return Err(ActionError::ActionBudgetExceeded { budget });
        }
        Ok(())
    }

    fn record(&mut self, kind: ActionKind) -> ActionRecord {
        ActionRecord::new(
            self.turn,
            self.round_count,
            self.turns_taken[self.turn.index()],
            kind,
        )
    }

    fn accept(&mut self, record: ActionRecord) {
        debug!(game = %self.id, actor = %record.actor, kind = ?record.kind, "action accepted");
        if record.kind != ActionKind::EndTurn {
            self.action_count += 1;
        }
        self.log.push(record);
    }

    /// Place a tower for `actor`. Offensive towers start with the built-in
    /// forward logic.
    ///
    /// # Errors
    ///
    /// Turn errors, [`ActionError::IllegalPlacement`], or a logic error if
    /// the built-in program does not fit the size limit.
    pub fn install(
        &mut self,
        actor: Side,
        at: Position,
        projectile: bool,
    ) -> Result<TowerId, ActionError> {
        self.check_can_act(actor)?;
        let id = self.board.install(actor, at, projectile)?;
        if projectile {
            if let Err(err) = self.logic.install_default(id) {
                self.board.remove_tower(id);
                return Err(err.into());
            }
        }
        let mut record = self.record(ActionKind::Install);
        record.tower = Some(id);
        record.new = Some(at);
        record.projectile = projectile;
        self.accept(record);
        Ok(id)
    }

    /// Move one of `actor`'s towers.
    ///
    /// # Errors
    ///
    /// Turn errors, [`ActionError::NoActiveTower`] or
    /// [`ActionError::IllegalPlacement`].
    pub fn move_tower(
        &mut self,
        actor: Side,
        tower: TowerId,
        to: Position,
    ) -> Result<(), ActionError> {
        self.check_can_act(actor)?;
        let from = self.board.move_tower(actor, tower, to)?;
        let mut record = self.record(ActionKind::Move);
        record.tower = Some(tower);
        record.old = Some(from);
        record.new = Some(to);
        self.accept(record);
        Ok(())
    }

    /// Compile `source` and make it the logic of one of `actor`'s towers.
    /// The gateway is only called once the action is known to be legal.
    ///
    /// # Errors
    ///
    /// Turn errors, [`ActionError::NoActiveTower`], or the compile, size
    /// and timeout errors of the registry.
    pub fn modify_logic(
        &mut self,
        actor: Side,
        tower: TowerId,
        source: &str,
        gateway: &TimedGateway,
    ) -> Result<LogicChanged, ActionError> {
        self.check_can_act(actor)?;
        self.board.owned_tower(actor, tower)?;
        let changed = self.logic.submit_logic(tower, source, gateway)?;
        self.record_logic(tower, source);
        Ok(changed)
    }

    /// [`Game::modify_logic`] with bytecode that was compiled earlier.
    ///
    /// # Errors
    ///
    /// As [`Game::modify_logic`], minus compilation.
    pub fn replay_logic(
        &mut self,
        actor: Side,
        tower: TowerId,
        source: &str,
        bytecode: Vec<u8>,
    ) -> Result<LogicChanged, ActionError> {
        self.check_can_act(actor)?;
        self.board.owned_tower(actor, tower)?;
        let changed = self.logic.install_bytecode(tower, source, bytecode)?;
        self.record_logic(tower, source);
        Ok(changed)
    }

    fn record_logic(&mut self, tower: TowerId, source: &str) {
        let bytecode = self.logic.get(tower).map(|h| h.bytecode().to_vec());
        let mut record = self.record(ActionKind::ModifyLogic);
        record.tower = Some(tower);
        record.source = Some(source.to_owned());
        record.bytecode = bytecode;
        self.accept(record);
    }

    /// End `actor`'s turn, resolving a round when the schedule says so.
    ///
    /// Resolution happens before anything is changed, so a failed
    /// resolution rejects the `EndTurn` with the game untouched.
    ///
    /// # Errors
    ///
    /// Turn errors, [`ActionError::EndTurnWithoutAction`] or
    /// [`ActionError::RoundResolutionOverrun`].
    pub fn end_turn(&mut self, actor: Side, now: u64) -> Result<TurnOutcome, ActionError> {
        self.check_turn(actor)?;
        let first_turn = self.turns_taken == [0, 0];
        if self.action_count == 0 && !first_turn && !self.is_ghost(actor) {
            return Err(ActionError::EndTurnWithoutAction);
        }

        let resolves = match self.rules.turns.resolution {
            ResolutionSchedule::EveryTurn => true,
            ResolutionSchedule::EveryRound => actor == Side::Player2,
        };
        let report = if resolves {
            Some(resolve_round(
                &self.board,
                &self.logic,
                &self.rules,
                self.round_count,
            )?)
        } else {
            None
        };

        let record = self.record(ActionKind::EndTurn);
        self.accept(record);

        let mut path = Vec::with_capacity(2);
        let mut destroyed = Vec::new();
        if let Some(report) = report {
            path.push(Phase::Resolving);
            for event in &report.damage {
                if self.board.apply_damage(event.target, event.amount) {
                    destroyed.push(event.target);
                    if let Target::Tower(id) = event.target {
                        self.logic.remove(id);
                    }
                }
            }
            self.last_round = Some(report);
        }

        self.turns_taken[actor.index()] += 1;
        self.action_count = 0;
        if actor == Side::Player2 {
            self.round_count += 1;
        }

        let p1_down = self.board.castle(Side::Player1).is_destroyed();
        let p2_down = self.board.castle(Side::Player2).is_destroyed();
        let winner = if p1_down {
            Some(Side::Player2)
        } else if p2_down {
            Some(Side::Player1)
        } else if self.round_count >= self.rules.turns.max_rounds {
            Some(Side::Player2)
        } else {
            None
        };

        if let Some(side) = winner {
            self.winner = Some(side);
            self.end_timestamp = Some(now);
            info!(game = %self.id, winner = %side, rounds = self.round_count, "game ended");
        } else {
            self.turn = actor.opponent();
        }
        path.push(self.phase());

        Ok(TurnOutcome {
            path,
            resolved: resolves,
            destroyed,
            winner,
        })
    }

    /// Let the ghost in player 2's seat take its turn, if it is due.
    ///
    /// A failure can leave replayed actions applied; run this on a copy.
    ///
    /// # Errors
    ///
    /// Whatever the ghost's `EndTurn` fails with.
    pub fn play_ghost_turn(&mut self, now: u64) -> Result<Option<TurnOutcome>, ActionError> {
        if self.is_ended() || self.turn != Side::Player2 {
            return Ok(None);
        }
        let Seat::Ghost(ghost) = &mut self.player2 else {
            return Ok(None);
        };
        let mut ghost = mem::take(ghost);
        let outcome = ghost.play_turn(self, now);
        self.player2 = Seat::Ghost(ghost);
        outcome.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::gateway::ScriptGateway;
    use std::time::Duration;

    fn human_game(rules: EngineConfig) -> Game {
        Game::new(
            GameId(1),
            PlayerId::new("alice"),
            Seat::Human(PlayerId::new("bob")),
            0,
            Arc::new(rules),
            100,
        )
    }

    fn gateway() -> TimedGateway {
        TimedGateway::new(Arc::new(ScriptGateway), Duration::from_secs(5))
    }

    #[test]
    fn test_one_action_per_turn() {
        let mut game = human_game(EngineConfig::default());
        game.install(Side::Player1, Position::new(2, 2), false).unwrap();
        assert_eq!(game.action_count(), 1);
        let err = game
            .install(Side::Player1, Position::new(3, 3), false)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ActionBudgetExceeded);
        assert_eq!(game.board().towers().count(), 1);
        assert_eq!(game.action_count(), 1);
    }

    #[test]
    fn test_out_of_turn_is_rejected() {
        let mut game = human_game(EngineConfig::default());
        let err = game
            .install(Side::Player2, Position::new(10, 2), false)
            .unwrap_err();
        assert_eq!(
            err,
            ActionError::OutOfTurn {
                actor: Side::Player2,
                expected: Side::Player1
            }
        );
    }

    #[test]
    fn test_end_turn_requires_action_after_first_turn() {
        let mut game = human_game(EngineConfig::default());
        let outcome = game.end_turn(Side::Player1, 101).unwrap();
        assert_eq!(outcome.path, vec![Phase::AwaitingPlayer2]);
        assert_eq!(
            game.end_turn(Side::Player2, 102),
            Err(ActionError::EndTurnWithoutAction)
        );
        game.install(Side::Player2, Position::new(10, 1), false).unwrap();
        let outcome = game.end_turn(Side::Player2, 103).unwrap();
        assert_eq!(outcome.path, vec![Phase::Resolving, Phase::AwaitingPlayer1]);
        assert_eq!(game.round_count(), 1);
        assert_eq!(game.action_count(), 0);
    }

    #[test]
    fn test_round_cap_ends_game_for_defender() {
        let mut rules = EngineConfig::default();
        rules.turns.max_rounds = 1;
        let mut game = human_game(rules);
        game.end_turn(Side::Player1, 101).unwrap();
        game.install(Side::Player2, Position::new(10, 1), false).unwrap();
        let outcome = game.end_turn(Side::Player2, 150).unwrap();
        assert_eq!(outcome.winner, Some(Side::Player2));
        assert_eq!(game.phase(), Phase::Ended);
        assert_eq!(game.end_timestamp(), Some(150));
        let err = game
            .install(Side::Player1, Position::new(1, 1), false)
            .unwrap_err();
        assert_eq!(err, ActionError::GameEnded(GameId(1)));
    }

    #[test]
    fn test_modify_logic_is_logged_with_bytecode() {
        let mut game = human_game(EngineConfig::default());
        let id = game.install(Side::Player1, Position::new(2, 2), false).unwrap();
        game.end_turn(Side::Player1, 101).unwrap();
        game.install(Side::Player2, Position::new(10, 1), false).unwrap();
        game.end_turn(Side::Player2, 102).unwrap();

        game.modify_logic(Side::Player1, id, "y = y + 1", &gateway())
            .unwrap();
        let record = game.log().last().unwrap();
        assert_eq!(record.kind, ActionKind::ModifyLogic);
        assert_eq!(record.own_turn, 1);
        assert_eq!(record.round, 1);
        assert!(record.bytecode.as_ref().is_some_and(|b| !b.is_empty()));
    }

    #[test]
    fn test_modify_logic_on_foreign_tower() {
        let mut game = human_game(EngineConfig::default());
        game.end_turn(Side::Player1, 101).unwrap();
        let theirs = game.install(Side::Player2, Position::new(10, 1), true).unwrap();
        game.end_turn(Side::Player2, 102).unwrap();
        let err = game
            .modify_logic(Side::Player1, theirs, "x = x + 1", &gateway())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoActiveTower);
        assert_eq!(game.action_count(), 0);
    }

    #[test]
    fn test_castle_destruction_ends_game() {
        let mut rules = EngineConfig::default();
        rules.health.castle = 1;
        let mut game = human_game(rules);
        game.install(Side::Player1, Position::new(1, 3), true).unwrap();
        game.end_turn(Side::Player1, 101).unwrap();
        game.install(Side::Player2, Position::new(10, 0), false).unwrap();
        let outcome = game.end_turn(Side::Player2, 102).unwrap();
        assert_eq!(outcome.destroyed, vec![Target::Castle(Side::Player2)]);
        assert_eq!(outcome.winner, Some(Side::Player1));
        assert_eq!(outcome.path, vec![Phase::Resolving, Phase::Ended]);
    }

    #[test]
    fn test_every_turn_schedule_resolves_after_player1() {
        let mut rules = EngineConfig::default();
        rules.turns.resolution = ResolutionSchedule::EveryTurn;
        let mut game = human_game(rules);
        game.install(Side::Player1, Position::new(1, 3), true).unwrap();
        let outcome = game.end_turn(Side::Player1, 101).unwrap();
        assert!(outcome.resolved);
        assert_eq!(game.board().castle(Side::Player2).health, 2);
        assert_eq!(game.round_count(), 0);
    }
}
