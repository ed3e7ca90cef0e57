//! Game storage.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use thiserror::Error;

use crate::game::{Game, GameId, PlayerId, Seat};

/// The store could not serve a request. Aborts the action in flight.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// The backend is down or refused the request.
    #[error("game store unavailable: {0}")]
    Unavailable(String),
}

/// Key-value storage for games, keyed by game id, with a current-game
/// pointer per player.
///
/// `put` is the only write and must be atomic: after it returns the new
/// game and the pointers it implies are visible together, or nothing is.
pub trait GameStore: Send + Sync {
    /// Fetch a game.
    ///
    /// # Errors
    ///
    /// [`StorageError`] when the backend fails.
    fn get(&self, id: GameId) -> Result<Option<Game>, StorageError>;

    /// Store a game. Unfinished games become the current game of their
    /// human players; finished games clear it.
    ///
    /// # Errors
    ///
    /// [`StorageError`] when the backend fails; nothing is written.
    fn put(&self, game: Game) -> Result<(), StorageError>;

    /// The unfinished game of `player`.
    ///
    /// # Errors
    ///
    /// [`StorageError`] when the backend fails.
    fn current_game(&self, player: &PlayerId) -> Result<Option<GameId>, StorageError>;

    /// Reserve a fresh game id.
    ///
    /// # Errors
    ///
    /// [`StorageError`] when the backend fails.
    fn next_id(&self) -> Result<GameId, StorageError>;
}

#[derive(Debug, Default)]
struct Tables {
    games: HashMap<GameId, Game>,
    current: HashMap<PlayerId, GameId>,
    next_id: u64,
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Number of stored games.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .games
            .len()
    }

    /// True when no game is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl GameStore for MemoryStore {
    fn get(&self, id: GameId) -> Result<Option<Game>, StorageError> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tables.games.get(&id).cloned())
    }

    fn put(&self, game: Game) -> Result<(), StorageError> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let mut humans = vec![game.player1().clone()];
        if let Seat::Human(p) = game.player2() {
            humans.push(p.clone());
        }
        for player in humans {
            if game.is_ended() {
                if tables.current.get(&player) == Some(&game.id()) {
                    tables.current.remove(&player);
                }
            } else {
                tables.current.insert(player, game.id());
            }
        }
        tables.games.insert(game.id(), game);
        Ok(())
    }

    fn current_game(&self, player: &PlayerId) -> Result<Option<GameId>, StorageError> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tables.current.get(player).copied())
    }

    fn next_id(&self) -> Result<GameId, StorageError> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let id = GameId(tables.next_id);
        tables.next_id += 1;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::EngineConfig;
    use crate::game::{GhostPlayer, Side};

    #[test]
    fn test_current_game_follows_put() {
        let store = MemoryStore::new();
        let mut rules = EngineConfig::default();
        rules.turns.max_rounds = 1;
        let id = store.next_id().unwrap();
        let alice = PlayerId::new("alice");
        let mut game = Game::new(
            id,
            alice.clone(),
            Seat::Ghost(GhostPlayer::empty()),
            0,
            Arc::new(rules),
            0,
        );
        store.put(game.clone()).unwrap();
        assert_eq!(store.current_game(&alice).unwrap(), Some(id));

        game.end_turn(Side::Player1, 1).unwrap();
        game.play_ghost_turn(2).unwrap();
        assert!(game.is_ended());
        store.put(game).unwrap();
        assert_eq!(store.current_game(&alice).unwrap(), None);
        assert_eq!(store.len(), 1);
        assert_ne!(store.next_id().unwrap(), id);
    }
}
