//! Board model: grid, castles and towers.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{BoardConfig, HealthConfig};
use crate::error::ActionError;

/// A cell on the grid. Off-grid values are representable so that
/// trajectories can leave the board.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Position {
    /// Column, growing toward player 2.
    pub x: i16,
    /// Row.
    pub y: i16,
}

impl Position {
    /// Create a position.
    #[must_use]
    pub const fn new(x: i16, y: i16) -> Self {
        Position { x, y }
    }

    /// Reflection across the vertical midline of a board `width` wide.
    #[must_use]
    pub fn mirrored(self, width: i16) -> Self {
        Position::new(width - 1 - self.x, self.y)
    }

    /// Squared Euclidean distance.
    #[must_use]
    pub fn distance_sq(self, other: Position) -> i64 {
        let dx = i64::from(self.x) - i64::from(other.x);
        let dy = i64::from(self.y) - i64::from(other.y);
        dx * dx + dy * dy
    }

    /// Chebyshev (king-move) distance.
    #[must_use]
    pub fn chebyshev(self, other: Position) -> u32 {
        let dx = (i32::from(self.x) - i32::from(other.x)).unsigned_abs();
        let dy = (i32::from(self.y) - i32::from(other.y)).unsigned_abs();
        dx.max(dy)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// One of the two seats in a game. Player 1 is the challenger and moves
/// first; player 2 defends.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Side {
    /// Challenger, left half.
    Player1,
    /// Defender, right half.
    Player2,
}

impl Side {
    /// The other side.
    #[must_use]
    pub fn opponent(self) -> Side {
        match self {
            Side::Player1 => Side::Player2,
            Side::Player2 => Side::Player1,
        }
    }

    /// Index into per-side arrays.
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Side::Player1 => 0,
            Side::Player2 => 1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Player1 => write!(f, "player 1"),
            Side::Player2 => write!(f, "player 2"),
        }
    }
}

/// Tower identity, unique within a game and never reused.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TowerId(pub u32);

impl fmt::Display for TowerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tower #{}", self.0)
    }
}

/// A side's castle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Castle {
    /// Owner.
    pub side: Side,
    /// Fixed cell.
    pub position: Position,
    /// Remaining hit points.
    pub health: u8,
    /// Starting hit points.
    pub max_health: u8,
}

impl Castle {
    /// True once health reaches zero.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.health == 0
    }
}

/// A tower on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tower {
    /// Identity.
    pub id: TowerId,
    /// Owning side.
    pub owner: Side,
    /// Current cell.
    pub position: Position,
    /// Remaining hit points.
    pub health: u8,
    /// Starting hit points.
    pub max_health: u8,
    /// Offensive towers fire every round; defensive ones only block.
    pub projectile: bool,
}

/// Something a projectile can hit.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Target {
    /// A side's castle.
    Castle(Side),
    /// A tower.
    Tower(TowerId),
}

/// Why a cell cannot take a tower.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Error)]
pub enum PlacementIssue {
    /// Outside the grid.
    #[error("outside the grid")]
    OutsideGrid,
    /// In the opponent's half.
    #[error("in the opponent's half")]
    WrongHalf,
    /// Another tower or a castle is there.
    #[error("the cell is occupied")]
    Occupied,
}

/// Grid, both castles, and all live towers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    width: i16,
    height: i16,
    castles: [Castle; 2],
    towers: BTreeMap<TowerId, Tower>,
    next_tower: u32,
    tower_health: u8,
}

impl Board {
    /// An empty board with full-health castles.
    #[must_use]
    pub fn new(board: &BoardConfig, health: &HealthConfig) -> Self {
        let castle = |side, position| Castle {
            side,
            position,
            health: health.castle,
            max_health: health.castle,
        };
        Board {
            width: board.width,
            height: board.height,
            castles: [
                castle(Side::Player1, board.player1_castle),
                castle(Side::Player2, board.player2_castle),
            ],
            towers: BTreeMap::new(),
            next_tower: 0,
            tower_health: health.tower,
        }
    }

    /// Columns.
    #[must_use]
    pub fn width(&self) -> i16 {
        self.width
    }

    /// Rows.
    #[must_use]
    pub fn height(&self) -> i16 {
        self.height
    }

    /// True when `pos` is on the grid.
    #[must_use]
    pub fn contains(&self, pos: Position) -> bool {
        (0..self.width).contains(&pos.x) && (0..self.height).contains(&pos.y)
    }

    /// The side whose half contains column `pos.x`.
    #[must_use]
    pub fn half_of(&self, pos: Position) -> Side {
        if pos.x < self.width / 2 {
            Side::Player1
        } else {
            Side::Player2
        }
    }

    /// A side's castle.
    #[must_use]
    pub fn castle(&self, side: Side) -> &Castle {
        &self.castles[side.index()]
    }

    /// Both castles, player 1 first.
    #[must_use]
    pub fn castles(&self) -> &[Castle; 2] {
        &self.castles
    }

    /// A live tower.
    #[must_use]
    pub fn tower(&self, id: TowerId) -> Option<&Tower> {
        self.towers.get(&id)
    }

    /// All live towers in id order.
    pub fn towers(&self) -> impl Iterator<Item = &Tower> {
        self.towers.values()
    }

    /// The tower standing on `pos`.
    #[must_use]
    pub fn tower_at(&self, pos: Position) -> Option<&Tower> {
        self.towers.values().find(|t| t.position == pos)
    }

    /// Whether `side` may put a tower on `pos`.
    ///
    /// # Errors
    ///
    /// The first [`PlacementIssue`] found.
    pub fn check_placement(&self, side: Side, pos: Position) -> Result<(), PlacementIssue> {
        if !self.contains(pos) {
            return Err(PlacementIssue::OutsideGrid);
        }
        if self.half_of(pos) != side {
            return Err(PlacementIssue::WrongHalf);
        }
        let castle_there = self.castles.iter().any(|c| c.position == pos);
        if castle_there || self.tower_at(pos).is_some() {
            return Err(PlacementIssue::Occupied);
        }
        Ok(())
    }

    /// Place a new tower for `side`.
    ///
    /// # Errors
    ///
    /// [`ActionError::IllegalPlacement`].
    pub fn install(
        &mut self,
        side: Side,
        at: Position,
        projectile: bool,
    ) -> Result<TowerId, ActionError> {
        self.check_placement(side, at)
            .map_err(|issue| ActionError::IllegalPlacement { at, issue })?;
        let id = TowerId(self.next_tower);
        self.next_tower += 1;
        self.towers.insert(
            id,
            Tower {
                id,
                owner: side,
                position: at,
                health: self.tower_health,
                max_health: self.tower_health,
                projectile,
            },
        );
        Ok(id)
    }

    /// Take a tower off the board.
    pub fn remove_tower(&mut self, id: TowerId) -> Option<Tower> {
        self.towers.remove(&id)
    }

    /// The tower `id` if it is alive and owned by `side`.
    ///
    /// # Errors
    ///
    /// [`ActionError::NoActiveTower`].
    pub fn owned_tower(&self, side: Side, id: TowerId) -> Result<&Tower, ActionError> {
        self.towers
            .get(&id)
            .filter(|t| t.owner == side)
            .ok_or(ActionError::NoActiveTower { tower: id, side })
    }

    /// Move one of `side`'s towers and return where it came from.
    ///
    /// # Errors
    ///
    /// [`ActionError::NoActiveTower`] or [`ActionError::IllegalPlacement`].
    pub fn move_tower(
        &mut self,
        side: Side,
        id: TowerId,
        to: Position,
    ) -> Result<Position, ActionError> {
        let from = self.owned_tower(side, id)?.position;
        self.check_placement(side, to)
            .map_err(|issue| ActionError::IllegalPlacement { at: to, issue })?;
        if let Some(tower) = self.towers.get_mut(&id) {
            tower.position = to;
        }
        Ok(from)
    }

    /// Subtract `amount` hit points. Returns true when the target is
    /// destroyed by this hit; destroyed towers are removed.
    pub fn apply_damage(&mut self, target: Target, amount: u8) -> bool {
        match target {
            Target::Castle(side) => {
                let castle = &mut self.castles[side.index()];
                let was_standing = !castle.is_destroyed();
                castle.health = castle.health.saturating_sub(amount);
                was_standing && castle.is_destroyed()
            }
            Target::Tower(id) => {
                let Some(tower) = self.towers.get_mut(&id) else {
                    return false;
                };
                tower.health = tower.health.saturating_sub(amount);
                if tower.health == 0 {
                    self.towers.remove(&id);
                    true
                } else {
                    false
                }
            }
        }
    }
}
