//! Engine facade: action submission, game creation and queries over a
//! game store and the shared ledger.

mod clock;
mod store;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::ActionError;
use crate::game::{
    Action, Board, Game, GameId, GhostPlayer, Phase, PlayerId, Seat, Side, TowerId,
};
use crate::gateway::{CompilationGateway, TimedGateway};
use crate::ledger::{LeaderboardEntry, ProgressionLedger, SavedGameId, SharedLedger};
use crate::sim::RoundReport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use store::{GameStore, MemoryStore, StorageError};

/// Who a new game is played against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Opponent {
    /// The ghost of the champion of the challenger's level.
    Ladder,
    /// Another player.
    Human(PlayerId),
}

/// Read-only view of a seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatView {
    /// A human player.
    Human(PlayerId),
    /// A replayed saved game, if the level had a champion.
    Ghost(Option<SavedGameId>),
}

/// Snapshot returned by successful actions and queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GameView {
    /// Identity.
    pub id: GameId,
    /// Challenger.
    pub player1: PlayerId,
    /// Defender.
    pub player2: SeatView,
    /// Ladder level.
    pub level: u32,
    /// Current phase.
    pub phase: Phase,
    /// Side to act.
    pub turn: Side,
    /// Actions spent this turn.
    pub action_count: u8,
    /// Completed rounds.
    pub round_count: u32,
    /// Creation time.
    pub start_timestamp: u64,
    /// End time; 0 while running.
    pub end_timestamp: u64,
    /// Winner, once ended.
    pub winner: Option<Side>,
    /// The board.
    pub board: Board,
    /// Number of logged actions.
    pub actions_logged: usize,
}

impl GameView {
    /// Snapshot `game`.
    #[must_use]
    pub fn of(game: &Game) -> Self {
        GameView {
            id: game.id(),
            player1: game.player1().clone(),
            player2: match game.player2() {
                Seat::Human(p) => SeatView::Human(p.clone()),
                Seat::Ghost(ghost) => SeatView::Ghost(ghost.saved()),
            },
            level: game.level(),
            phase: game.phase(),
            turn: game.turn(),
            action_count: game.action_count(),
            round_count: game.round_count(),
            start_timestamp: game.start_timestamp(),
            end_timestamp: game.end_timestamp().unwrap_or(0),
            winner: game.winner(),
            board: game.board().clone(),
            actions_logged: game.log().len(),
        }
    }
}

/// Runs games for many players.
///
/// Each game is mutated by one action at a time; different games proceed
/// in parallel. Only the ledger is shared between games.
pub struct Engine {
    rules: Arc<EngineConfig>,
    gateway: TimedGateway,
    store: Box<dyn GameStore>,
    ledger: SharedLedger,
    clock: Box<dyn Clock>,
    locks: Mutex<HashMap<GameId, Arc<Mutex<()>>>>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("rules", &self.rules)
            .field("gateway", &self.gateway)
            .field("ledger", &self.ledger)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// An engine with an in-memory store, the system clock and an empty
    /// ledger.
    #[must_use]
    pub fn new(rules: EngineConfig, compiler: Arc<dyn CompilationGateway>) -> Self {
        let gateway = TimedGateway::new(compiler, rules.logic.gateway_timeout())
            .with_max_in_flight(rules.logic.gateway_max_in_flight);
        Engine {
            rules: Arc::new(rules),
            gateway,
            store: Box::new(MemoryStore::new()),
            ledger: SharedLedger::default(),
            clock: Box::new(SystemClock),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Use `store` for games.
    #[must_use]
    pub fn with_store(mut self, store: impl GameStore + 'static) -> Self {
        self.store = Box::new(store);
        self
    }

    /// Use `clock` for timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Start from `ledger`.
    #[must_use]
    pub fn with_ledger(mut self, ledger: ProgressionLedger) -> Self {
        self.ledger = SharedLedger::new(ledger);
        self
    }

    /// Rules applied to new games.
    #[must_use]
    pub fn rules(&self) -> &EngineConfig {
        &self.rules
    }

    /// The shared ledger.
    #[must_use]
    pub fn ledger(&self) -> &SharedLedger {
        &self.ledger
    }

    /// Claim a username.
    ///
    /// # Errors
    ///
    /// [`ActionError::UsernameTaken`].
    pub fn register_player(&self, player: &PlayerId, username: &str) -> Result<(), ActionError> {
        self.ledger
            .update(|l| l.register_username(player, username))?;
        info!(%player, username, "player registered");
        Ok(())
    }

    /// Start a game for `player` at the level their streak has reached.
    ///
    /// # Errors
    ///
    /// [`ActionError::SelfOpponent`] when `player` names themselves as the
    /// opponent, [`ActionError::ActiveGameExists`] if either human already
    /// has an unfinished game, or [`ActionError::Storage`].
    pub fn create_game(
        &self,
        player: &PlayerId,
        opponent: Opponent,
    ) -> Result<GameView, ActionError> {
        if matches!(&opponent, Opponent::Human(other) if other == player) {
            return Err(ActionError::SelfOpponent(player.clone()));
        }
        self.ensure_idle(player)?;
        let (level, ghost) = self.ledger.read(|l| {
            let level = l.level_for(player);
            // A climber never replays their own saved game.
            let ghost = l
                .champion(level)
                .filter(|c| c.player != *player)
                .map_or_else(GhostPlayer::empty, GhostPlayer::from_saved);
            (level, ghost)
        });
        let seat = match opponent {
            Opponent::Ladder => Seat::Ghost(ghost),
            Opponent::Human(other) => {
                self.ensure_idle(&other)?;
                Seat::Human(other)
            }
        };
        let id = self.store.next_id().map_err(storage)?;
        let game = Game::new(
            id,
            player.clone(),
            seat,
            level,
            Arc::clone(&self.rules),
            self.clock.now(),
        );
        let view = GameView::of(&game);
        self.store.put(game).map_err(storage)?;
        info!(game = %id, %player, level, "game created");
        Ok(view)
    }

    fn ensure_idle(&self, player: &PlayerId) -> Result<(), ActionError> {
        match self.store.current_game(player).map_err(storage)? {
            Some(game) => Err(ActionError::ActiveGameExists {
                player: player.clone(),
                game,
            }),
            None => Ok(()),
        }
    }

    /// Apply `action` for `actor`.
    ///
    /// The action runs on a copy of the game, which replaces the stored
    /// game in one write. Ghost turns that follow are played before the
    /// write. A finished game is reported to the ledger.
    ///
    /// # Errors
    ///
    /// Any [`ActionError`]; nothing is stored on error.
    pub fn submit_action(
        &self,
        game_id: GameId,
        actor: &PlayerId,
        action: Action,
    ) -> Result<GameView, ActionError> {
        let lock = self.lock_for(game_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let kind = action.kind();
        let result = self.apply(game_id, actor, action);
        let settled = match &result {
            Ok(view) => view.phase == Phase::Ended,
            Err(err) => matches!(err, ActionError::GameEnded(_) | ActionError::UnknownGame(_)),
        };
        if settled {
            self.release_lock(game_id);
        }
        match &result {
            Ok(view) => debug!(game = %game_id, %actor, ?kind, phase = ?view.phase, "action applied"),
            Err(err) => debug!(game = %game_id, %actor, ?kind, %err, "action rejected"),
        }
        result
    }

    fn apply(
        &self,
        game_id: GameId,
        actor: &PlayerId,
        action: Action,
    ) -> Result<GameView, ActionError> {
        let mut game = self.load(game_id)?;
        let side = game
            .seat_of(actor)
            .ok_or_else(|| ActionError::NotAParticipant {
                player: actor.clone(),
                game: game_id,
            })?;

        let now = self.clock.now();
        match action {
            Action::Install { at, projectile } => {
                game.install(side, at, projectile)?;
            }
            Action::Move { tower, to } => game.move_tower(side, tower, to)?,
            Action::ModifyLogic { tower, source } => {
                game.modify_logic(side, tower, &source, &self.gateway)?;
            }
            Action::EndTurn => {
                game.end_turn(side, now)?;
                game.play_ghost_turn(now)?;
            }
        }

        let view = GameView::of(&game);
        let ended = game.is_ended();
        let finished = ended.then(|| game.clone());
        self.store.put(game).map_err(storage)?;
        if let Some(game) = finished {
            self.record_result(&game);
        }
        Ok(view)
    }

    fn record_result(&self, game: &Game) {
        if let Err(err) = self.ledger.update(|l| l.on_game_ended(game)) {
            warn!(game = %game.id(), %err, "ledger rejected finished game");
        }
    }

    fn load(&self, id: GameId) -> Result<Game, ActionError> {
        self.store
            .get(id)
            .map_err(storage)?
            .ok_or(ActionError::UnknownGame(id))
    }

    fn lock_for(&self, id: GameId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(id).or_default())
    }

    /// Forget the lock of a game that accepts no more actions. Callers
    /// still holding it only see the game as ended.
    fn release_lock(&self, id: GameId) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.remove(&id);
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Snapshot of a game.
    ///
    /// # Errors
    ///
    /// [`ActionError::UnknownGame`] or [`ActionError::Storage`].
    pub fn game(&self, id: GameId) -> Result<GameView, ActionError> {
        self.load(id).map(|g| GameView::of(&g))
    }

    /// A game's board.
    ///
    /// # Errors
    ///
    /// [`ActionError::UnknownGame`] or [`ActionError::Storage`].
    pub fn board(&self, id: GameId) -> Result<Board, ActionError> {
        self.load(id).map(|g| g.board().clone())
    }

    /// The latest round of a game, for tick-by-tick playback.
    ///
    /// # Errors
    ///
    /// [`ActionError::UnknownGame`] or [`ActionError::Storage`].
    pub fn last_round(&self, id: GameId) -> Result<Option<RoundReport>, ActionError> {
        self.load(id).map(|g| g.last_round().cloned())
    }

    /// Deployed logic size of a tower, in bytes.
    ///
    /// # Errors
    ///
    /// [`ActionError::UnknownGame`] or [`ActionError::Storage`].
    pub fn logic_size(&self, id: GameId, tower: TowerId) -> Result<Option<usize>, ActionError> {
        self.load(id).map(|g| g.logic().logic_size(tower))
    }

    /// A player's unfinished game.
    ///
    /// # Errors
    ///
    /// [`ActionError::Storage`].
    pub fn current_game(&self, player: &PlayerId) -> Result<Option<GameId>, ActionError> {
        self.store.current_game(player).map_err(storage)
    }

    /// Current leaderboard.
    #[must_use]
    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        self.ledger.read(ProgressionLedger::leaderboard)
    }
}

fn storage(err: StorageError) -> ActionError {
    ActionError::Storage(err.to_string())
}
