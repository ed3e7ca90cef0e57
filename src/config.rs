//! Engine configuration.
//!
//! Every section falls back to its defaults, so a JSON file only needs the
//! keys it changes:
//!
//! ```json
//! { "simulation": { "tick_count": 12 }, "turns": { "max_rounds": 5 } }
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::game::Position;
use crate::gateway::DEFAULT_MAX_IN_FLIGHT;
use crate::vm::{DEFAULT_MEMORY_SIZE, Metering};

/// Full engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Grid and castle placement.
    pub board: BoardConfig,
    /// Hit points and damage.
    pub health: HealthConfig,
    /// Round resolution parameters.
    pub simulation: SimulationConfig,
    /// Turn and round limits.
    pub turns: TurnConfig,
    /// Logic deployment limits.
    pub logic: LogicConfig,
}

/// Tick-count profiles for round resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// 12 ticks per round.
    Sprint,
    /// 28 ticks per round.
    Classic,
    /// 140 ticks per round.
    Marathon,
}

impl Profile {
    /// Ticks simulated per round.
    #[must_use]
    pub fn tick_count(self) -> u32 {
        match self {
            Profile::Sprint => 12,
            Profile::Classic => 28,
            Profile::Marathon => 140,
        }
    }
}

/// Board geometry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    /// Columns. Player 1 owns the left half.
    pub width: i16,
    /// Rows.
    pub height: i16,
    /// Player 1's castle.
    pub player1_castle: Position,
    /// Player 2's castle.
    pub player2_castle: Position,
}

impl Default for BoardConfig {
    fn default() -> Self {
        BoardConfig {
            width: 14,
            height: 7,
            player1_castle: Position::new(0, 3),
            player2_castle: Position::new(13, 3),
        }
    }
}

/// Hit points and damage per hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Castle hit points.
    pub castle: u8,
    /// Tower hit points.
    pub tower: u8,
    /// Damage dealt by one projectile hit.
    pub damage: u8,
}

impl Default for HealthConfig {
    fn default() -> Self {
        HealthConfig {
            castle: 3,
            tower: 2,
            damage: 1,
        }
    }
}

/// Round resolution parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Ticks per round.
    pub tick_count: u32,
    /// Largest allowed Chebyshev step between consecutive ticks, in cells.
    pub max_step: u16,
    /// A hit is a squared distance strictly below `collision_radius²`.
    pub collision_radius: u16,
    /// Fuel for a single logic invocation.
    pub fuel_per_tick: u64,
    /// Fuel for all invocations of one round together.
    pub round_fuel_cap: u64,
    /// Program memory per invocation.
    pub memory_size: u32,
    /// Instruction costs.
    pub metering: Metering,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            tick_count: Profile::Classic.tick_count(),
            max_step: 2,
            collision_radius: 1,
            fuel_per_tick: 10_000,
            round_fuel_cap: 30_000_000,
            memory_size: DEFAULT_MEMORY_SIZE,
            metering: Metering::default(),
        }
    }
}

/// When rounds are resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSchedule {
    /// After player 2's turn only.
    #[default]
    EveryRound,
    /// After every turn.
    EveryTurn,
}

/// Turn and round limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    /// Actions allowed per turn.
    pub actions_per_turn: u8,
    /// Completed rounds after which the defender wins.
    pub max_rounds: u32,
    /// Resolution schedule.
    pub resolution: ResolutionSchedule,
}

impl Default for TurnConfig {
    fn default() -> Self {
        TurnConfig {
            actions_per_turn: 1,
            max_rounds: 10,
            resolution: ResolutionSchedule::EveryRound,
        }
    }
}

/// Logic deployment limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogicConfig {
    /// Largest accepted compiled image, in bytes.
    pub size_limit: usize,
    /// How long to wait for the compilation gateway.
    pub gateway_timeout_ms: u64,
    /// Compiler calls allowed to run at once, counting ones that timed out
    /// and are still running.
    pub gateway_max_in_flight: usize,
}

impl LogicConfig {
    /// Gateway timeout as a [`Duration`].
    #[must_use]
    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_millis(self.gateway_timeout_ms)
    }
}

impl Default for LogicConfig {
    fn default() -> Self {
        LogicConfig {
            size_limit: 1024,
            gateway_timeout_ms: 5_000,
            gateway_max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

/// Errors from loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// JSON did not match the schema.
    #[error("failed to parse engine config: {0}")]
    Parse(#[from] serde_json::Error),
    /// The file could not be read.
    #[error("failed to read engine config from {path:?}: {source}")]
    ReadFailed {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// Values that cannot describe a playable game.
    #[error("invalid engine config: {0}")]
    Invalid(String),
}

impl EngineConfig {
    /// Defaults with the tick count of `profile`.
    #[must_use]
    pub fn profile(profile: Profile) -> Self {
        let mut config = EngineConfig::default();
        config.simulation.tick_count = profile.tick_count();
        config
    }

    /// Parse and validate JSON.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] or [`ConfigError::Invalid`].
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`].
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        EngineConfig::from_json_str(&contents)
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] naming the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        let board = &self.board;
        if board.width < 2 || board.height < 1 {
            return invalid(format!("board {}x{} is too small", board.width, board.height));
        }
        let half = board.width / 2;
        let castles = [
            ("player1_castle", board.player1_castle, 0..half),
            ("player2_castle", board.player2_castle, half..board.width),
        ];
        for (name, pos, columns) in castles {
            if !columns.contains(&pos.x) || !(0..board.height).contains(&pos.y) {
                return invalid(format!("{name} {pos} is not inside its half of the board"));
            }
        }
        if self.health.castle == 0 || self.health.tower == 0 {
            return invalid("castles and towers need at least 1 hit point".into());
        }
        let sim = &self.simulation;
        if sim.tick_count == 0 || sim.collision_radius == 0 || sim.max_step == 0 {
            return invalid("tick_count, collision_radius and max_step must be positive".into());
        }
        if sim.fuel_per_tick == 0 || sim.round_fuel_cap < sim.fuel_per_tick {
            return invalid("round_fuel_cap must cover at least one invocation".into());
        }
        let costs = [
            sim.metering.base,
            sim.metering.memory,
            sim.metering.multiply,
            sim.metering.divide,
        ];
        if costs.contains(&0) {
            return invalid("every metering cost must be at least 1".into());
        }
        if sim.memory_size < 4096 {
            return invalid(format!("memory_size {} is below 4096 bytes", sim.memory_size));
        }
        if self.turns.actions_per_turn == 0 || self.turns.max_rounds == 0 {
            return invalid("actions_per_turn and max_rounds must be positive".into());
        }
        if self.logic.size_limit == 0 || self.logic.gateway_max_in_flight == 0 {
            return invalid("size_limit and gateway_max_in_flight must be positive".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.board.width, 14);
        assert_eq!(config.board.player2_castle, Position::new(13, 3));
        assert_eq!(config.turns.max_rounds, 10);
        assert_eq!(config.simulation.tick_count, 28);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config =
            EngineConfig::from_json_str(r#"{ "simulation": { "tick_count": 12 } }"#).unwrap();
        assert_eq!(config.simulation.tick_count, 12);
        assert_eq!(config.simulation.collision_radius, 1);
        assert_eq!(config.logic.size_limit, 1024);
        assert_eq!(config.turns.resolution, ResolutionSchedule::EveryRound);
    }

    #[test]
    fn test_schedule_names() {
        let config =
            EngineConfig::from_json_str(r#"{ "turns": { "resolution": "every_turn" } }"#).unwrap();
        assert_eq!(config.turns.resolution, ResolutionSchedule::EveryTurn);
    }

    #[test]
    fn test_castle_in_wrong_half_is_rejected() {
        let err = EngineConfig::from_json_str(
            r#"{ "board": { "player1_castle": { "x": 9, "y": 3 } } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "{err}");
    }

    #[test]
    fn test_profiles() {
        assert_eq!(EngineConfig::profile(Profile::Sprint).simulation.tick_count, 12);
        assert_eq!(EngineConfig::profile(Profile::Marathon).simulation.tick_count, 140);
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{ "health": {{ "castle": 5 }} }}"#).unwrap();
        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.health.castle, 5);
        assert_eq!(config.health.tower, 2);

        let missing = EngineConfig::from_file(Path::new("/nonexistent/rampart.json"));
        assert!(matches!(missing, Err(ConfigError::ReadFailed { .. })));
    }

    #[test]
    fn test_free_instructions_are_rejected() {
        for class in ["base", "memory", "multiply", "divide"] {
            let json = format!(r#"{{ "simulation": {{ "metering": {{ "{class}": 0 }} }} }}"#);
            let err = EngineConfig::from_json_str(&json).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "{class}: {err}");
        }
        let mut config = EngineConfig::default();
        config.simulation.metering.base = 0;
        assert!(config.validate().is_err());
    }
}
