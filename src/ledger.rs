//! Progression ledger: saved games, level champions, win streaks and
//! usernames.
//!
//! The ledger is append-only for saved games. The only slot that changes is
//! the per-level champion pointer, and it only changes through
//! [`ProgressionLedger::compare_and_swap_champion`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::error::ActionError;
use crate::game::{ActionRecord, Game, GameId, PlayerId, Seat, Side};

/// Format version written by [`ProgressionLedger::save`].
pub const LEDGER_VERSION: u32 = 1;

/// Identity of a saved game.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SavedGameId(pub u64);

impl fmt::Display for SavedGameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "saved game #{}", self.0)
    }
}

/// A challenger's recorded game, replayable as a ghost. Never modified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedGame {
    /// Identity.
    pub id: SavedGameId,
    /// Level whose challengers face this game.
    pub level: u32,
    /// Game it was recorded from.
    pub game: GameId,
    /// Who played it.
    pub player: PlayerId,
    /// Their win streak when it was saved.
    pub streak: u32,
    /// When the game ended.
    pub saved_at: u64,
    /// Player 1's accepted actions.
    pub actions: Vec<ActionRecord>,
}

/// One row of the leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    /// Champion's address.
    pub player: PlayerId,
    /// Registered username, if any.
    pub username: Option<String>,
    /// Level held.
    pub level: u32,
    /// Streak of the champion game.
    pub streak: u32,
    /// The champion game.
    pub saved: SavedGameId,
}

/// What [`ProgressionLedger::on_game_ended`] changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerUpdate {
    /// The finished game.
    pub game: GameId,
    /// The challenger.
    pub player: PlayerId,
    /// Level played.
    pub level: u32,
    /// Whether the challenger won.
    pub won: bool,
    /// Challenger's streak afterwards.
    pub streak: u32,
    /// Saved game the challenger beat.
    pub beaten: Option<SavedGameId>,
    /// The challenger's newly saved game.
    pub saved: SavedGameId,
    /// Level at which the saved game became champion.
    pub champion_of: Option<u32>,
}

/// Ledger failures.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The game has not ended.
    #[error("{0} has not ended")]
    GameNotEnded(GameId),
    /// The file could not be read or written.
    #[error("ledger file {path:?}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// The file is not a ledger.
    #[error("failed to parse ledger: {0}")]
    Parse(#[from] serde_json::Error),
    /// Written by an incompatible version.
    #[error("unsupported ledger version {0}")]
    Version(u32),
}

/// Saved games and ladder state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressionLedger {
    version: u32,
    saved: Vec<SavedGame>,
    champions: BTreeMap<u32, SavedGameId>,
    games_by_level: BTreeMap<u32, Vec<GameId>>,
    streaks: BTreeMap<PlayerId, u32>,
    beaten: BTreeSet<SavedGameId>,
    usernames: BTreeMap<String, PlayerId>,
}

impl Default for ProgressionLedger {
    fn default() -> Self {
        ProgressionLedger {
            version: LEDGER_VERSION,
            saved: Vec::new(),
            champions: BTreeMap::new(),
            games_by_level: BTreeMap::new(),
            streaks: BTreeMap::new(),
            beaten: BTreeSet::new(),
            usernames: BTreeMap::new(),
        }
    }
}

impl ProgressionLedger {
    /// An empty ladder.
    #[must_use]
    pub fn new() -> Self {
        ProgressionLedger::default()
    }

    /// Claim `name` for `player`, releasing any name they held before.
    ///
    /// # Errors
    ///
    /// [`ActionError::UsernameTaken`] when someone else holds `name`.
    pub fn register_username(&mut self, player: &PlayerId, name: &str) -> Result<(), ActionError> {
        match self.usernames.get(name) {
            Some(owner) if owner == player => return Ok(()),
            Some(_) => return Err(ActionError::UsernameTaken(name.to_owned())),
            None => {}
        }
        self.usernames.retain(|_, owner| owner != player);
        self.usernames.insert(name.to_owned(), player.clone());
        Ok(())
    }

    /// `player`'s username.
    #[must_use]
    pub fn username(&self, player: &PlayerId) -> Option<&str> {
        self.usernames
            .iter()
            .find(|(_, owner)| *owner == player)
            .map(|(name, _)| name.as_str())
    }

    /// Current win streak.
    #[must_use]
    pub fn streak(&self, player: &PlayerId) -> u32 {
        self.streaks.get(player).copied().unwrap_or(0)
    }

    /// Level `player` plays next.
    #[must_use]
    pub fn level_for(&self, player: &PlayerId) -> u32 {
        self.streak(player)
    }

    /// A saved game.
    #[must_use]
    pub fn saved_game(&self, id: SavedGameId) -> Option<&SavedGame> {
        usize::try_from(id.0).ok().and_then(|i| self.saved.get(i))
    }

    /// All saved games, oldest first.
    #[must_use]
    pub fn saved_games(&self) -> &[SavedGame] {
        &self.saved
    }

    /// Champion of `level`.
    #[must_use]
    pub fn champion(&self, level: u32) -> Option<&SavedGame> {
        self.champions
            .get(&level)
            .and_then(|id| self.saved_game(*id))
    }

    /// True once a challenger has beaten `id`.
    #[must_use]
    pub fn is_beaten(&self, id: SavedGameId) -> bool {
        self.beaten.contains(&id)
    }

    /// Finished games played at `level`.
    #[must_use]
    pub fn games_at(&self, level: u32) -> &[GameId] {
        self.games_by_level.get(&level).map_or(&[][..], Vec::as_slice)
    }

    /// Point `level` at `new` if its champion is still `expected`.
    /// Returns whether the swap happened.
    pub fn compare_and_swap_champion(
        &mut self,
        level: u32,
        expected: Option<SavedGameId>,
        new: SavedGameId,
    ) -> bool {
        if self.champions.get(&level).copied() != expected {
            return false;
        }
        self.champions.insert(level, new);
        info!(level, champion = %new, "new level champion");
        true
    }

    /// Record a finished game.
    ///
    /// A challenger win at level `L` marks the replayed saved game beaten,
    /// bumps the streak and saves the game for `L + 1`. It becomes champion
    /// there unless an unbeaten champion has an equal or higher streak.
    /// A loss keeps the streak and saves the game for `L`; it only becomes
    /// champion when `L` has none.
    ///
    /// # Errors
    ///
    /// [`LedgerError::GameNotEnded`].
    pub fn on_game_ended(&mut self, game: &Game) -> Result<LedgerUpdate, LedgerError> {
        let (Some(winner), Some(ended_at)) = (game.winner(), game.end_timestamp()) else {
            return Err(LedgerError::GameNotEnded(game.id()));
        };
        let player = game.player1().clone();
        let level = game.level();
        let won = winner == Side::Player1;
        self.games_by_level.entry(level).or_default().push(game.id());

        let mut beaten = None;
        let mut streak = self.streak(&player);
        if won {
            if let Seat::Ghost(ghost) = game.player2() {
                beaten = ghost.saved();
            }
            if let Some(id) = beaten {
                self.beaten.insert(id);
            }
            streak += 1;
            self.streaks.insert(player.clone(), streak);
        }

        let saved_level = if won { level + 1 } else { level };
        let id = SavedGameId(self.saved.len() as u64);
        self.saved.push(SavedGame {
            id,
            level: saved_level,
            game: game.id(),
            player: player.clone(),
            streak,
            saved_at: ended_at,
            actions: game
                .log()
                .iter()
                .filter(|r| r.actor == Side::Player1)
                .cloned()
                .collect(),
        });

        let current = self.champions.get(&saved_level).copied();
        let takes_over = match current {
            None => true,
            Some(_) if !won => false,
            Some(existing) => {
                let defended = self
                    .saved_game(existing)
                    .is_some_and(|c| !self.is_beaten(existing) && c.streak >= streak);
                !defended
            }
        };
        let champion_of = (takes_over && self.compare_and_swap_champion(saved_level, current, id))
            .then_some(saved_level);

        info!(game = %game.id(), %player, level, won, streak, "ladder updated");
        Ok(LedgerUpdate {
            game: game.id(),
            player,
            level,
            won,
            streak,
            beaten,
            saved: id,
            champion_of,
        })
    }

    /// Owners of unbeaten champion games, highest level first, then
    /// highest streak.
    #[must_use]
    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        let mut entries: Vec<LeaderboardEntry> = self
            .champions
            .iter()
            .filter(|(_, id)| !self.is_beaten(**id))
            .filter_map(|(level, id)| {
                let saved = self.saved_game(*id)?;
                Some(LeaderboardEntry {
                    player: saved.player.clone(),
                    username: self.username(&saved.player).map(str::to_owned),
                    level: *level,
                    streak: saved.streak,
                    saved: *id,
                })
            })
            .collect();
        entries.sort_by(|a, b| b.level.cmp(&a.level).then(b.streak.cmp(&a.streak)));
        entries
    }

    /// Write the ledger as JSON.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Io`] or [`LedgerError::Parse`].
    pub fn save(&self, path: &Path) -> Result<(), LedgerError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| LedgerError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read a ledger written by [`ProgressionLedger::save`].
    ///
    /// # Errors
    ///
    /// Any [`LedgerError`] except `GameNotEnded`.
    pub fn load(path: &Path) -> Result<Self, LedgerError> {
        let json = fs::read_to_string(path).map_err(|source| LedgerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let ledger: ProgressionLedger = serde_json::from_str(&json)?;
        if ledger.version != LEDGER_VERSION {
            return Err(LedgerError::Version(ledger.version));
        }
        Ok(ledger)
    }

    /// [`ProgressionLedger::load`], or an empty ledger if `path` does not
    /// exist.
    ///
    /// # Errors
    ///
    /// As [`ProgressionLedger::load`].
    pub fn load_or_default(path: &Path) -> Result<Self, LedgerError> {
        if path.exists() {
            ProgressionLedger::load(path)
        } else {
            Ok(ProgressionLedger::new())
        }
    }
}

/// The ledger behind a lock, shared by all games of an engine.
#[derive(Debug, Default)]
pub struct SharedLedger {
    inner: Mutex<ProgressionLedger>,
}

impl SharedLedger {
    /// Share `ledger`.
    #[must_use]
    pub fn new(ledger: ProgressionLedger) -> Self {
        SharedLedger {
            inner: Mutex::new(ledger),
        }
    }

    /// Read under the lock.
    pub fn read<R>(&self, f: impl FnOnce(&ProgressionLedger) -> R) -> R {
        f(&self.inner.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Mutate under the lock.
    pub fn update<R>(&self, f: impl FnOnce(&mut ProgressionLedger) -> R) -> R {
        f(&mut self.inner.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// [`ProgressionLedger::compare_and_swap_champion`] under the lock.
    pub fn compare_and_swap_champion(
        &self,
        level: u32,
        expected: Option<SavedGameId>,
        new: SavedGameId,
    ) -> bool {
        self.update(|l| l.compare_and_swap_champion(level, expected, new))
    }

    /// A copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> ProgressionLedger {
        self.read(Clone::clone)
    }

    /// Unwrap the ledger.
    #[must_use]
    pub fn into_inner(self) -> ProgressionLedger {
        self.inner.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}
