//! Per-game registry of deployed tower logic.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use crate::error::ActionError;
use crate::game::TowerId;
use crate::gateway::{CompileError, GatewayError, TimedGateway};
use crate::vm::{ImageError, Program};

use super::defaults::{FORWARD_BYTECODE, FORWARD_SOURCE};

/// Deployed logic of one tower.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicHandle {
    tower: TowerId,
    source: String,
    bytecode: Arc<[u8]>,
    program: Arc<Program>,
}

impl LogicHandle {
    /// Owning tower.
    #[must_use]
    pub fn tower(&self) -> TowerId {
        self.tower
    }

    /// Source the bytecode was compiled from.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Compiled image as returned by the gateway.
    #[must_use]
    pub fn bytecode(&self) -> &[u8] {
        &self.bytecode
    }

    /// Validated, runnable program.
    #[must_use]
    pub fn program(&self) -> &Program {
        &self.program
    }
}

/// Emitted when a tower's logic is replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicChanged {
    /// The tower.
    pub tower: TowerId,
    /// Size of the new image in bytes.
    pub size: usize,
    /// Whether earlier logic was replaced.
    pub replaced: bool,
}

/// Why a logic submission was rejected. The previous logic stays in place.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LogicError {
    /// The gateway rejected the source.
    #[error("compile error: {0}")]
    Compile(#[from] CompileError),
    /// The gateway did not answer in time.
    #[error("compilation timed out after {0:?}")]
    Timeout(Duration),
    /// The gateway could not be reached.
    #[error("compiler unavailable: {0}")]
    Unavailable(String),
    /// The image is larger than the tower allows.
    #[error("compiled logic is {size} bytes, limit {limit}")]
    SizeLimitExceeded {
        /// Image size.
        size: usize,
        /// Tower limit.
        limit: usize,
    },
    /// The gateway returned bytes that cannot run.
    #[error("unusable program image: {0}")]
    InvalidImage(#[from] ImageError),
}

impl From<GatewayError> for LogicError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Compile(e) => LogicError::Compile(e),
            GatewayError::Timeout(after) => LogicError::Timeout(after),
            GatewayError::Unavailable(why) => LogicError::Unavailable(why),
        }
    }
}

impl From<LogicError> for ActionError {
    fn from(err: LogicError) -> Self {
        match err {
            LogicError::Timeout(after) => ActionError::GatewayTimeout(after),
            LogicError::SizeLimitExceeded { size, limit } => {
                ActionError::SizeLimitExceeded { size, limit }
            }
            other @ (LogicError::Compile(_)
            | LogicError::Unavailable(_)
            | LogicError::InvalidImage(_)) => ActionError::CompileFailure(other.to_string()),
        }
    }
}

/// Tower id to logic handle, with per-tower size limits.
///
/// Every replacement is all-or-nothing: a failed submission leaves the
/// previous handle untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicRegistry {
    handles: BTreeMap<TowerId, LogicHandle>,
    limits: BTreeMap<TowerId, usize>,
    default_limit: usize,
    memory_size: u32,
}

impl LogicRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new(default_limit: usize, memory_size: u32) -> Self {
        LogicRegistry {
            handles: BTreeMap::new(),
            limits: BTreeMap::new(),
            default_limit,
            memory_size,
        }
    }

    /// Size limit of `tower`.
    #[must_use]
    pub fn size_limit(&self, tower: TowerId) -> usize {
        self.limits.get(&tower).copied().unwrap_or(self.default_limit)
    }

    /// Override the size limit of one tower.
    pub fn set_size_limit(&mut self, tower: TowerId, limit: usize) {
        self.limits.insert(tower, limit);
    }

    /// Compile `source` through `gateway` and install it for `tower`.
    ///
    /// # Errors
    ///
    /// Any [`LogicError`]; the registry is unchanged on error.
    pub fn submit_logic(
        &mut self,
        tower: TowerId,
        source: &str,
        gateway: &TimedGateway,
    ) -> Result<LogicChanged, LogicError> {
        let bytecode = gateway.compile(source)?;
        self.install_bytecode(tower, source, bytecode)
    }

    /// Install already-compiled bytecode, e.g. when replaying a saved game.
    ///
    /// # Errors
    ///
    /// [`LogicError::SizeLimitExceeded`] or [`LogicError::InvalidImage`].
    pub fn install_bytecode(
        &mut self,
        tower: TowerId,
        source: &str,
        bytecode: Vec<u8>,
    ) -> Result<LogicChanged, LogicError> {
        let limit = self.size_limit(tower);
        if bytecode.len() > limit {
            debug!(%tower, size = bytecode.len(), limit, "logic over size limit");
            return Err(LogicError::SizeLimitExceeded {
                size: bytecode.len(),
                limit,
            });
        }
        let program = Program::from_bytes(&bytecode, self.memory_size)?;
        let size = bytecode.len();
        let handle = LogicHandle {
            tower,
            source: source.to_owned(),
            bytecode: bytecode.into(),
            program: Arc::new(program),
        };
        let replaced = self.handles.insert(tower, handle).is_some();
        info!(%tower, size, replaced, "logic deployed");
        Ok(LogicChanged {
            tower,
            size,
            replaced,
        })
    }

    /// Attach the built-in forward logic.
    ///
    /// # Errors
    ///
    /// Only if the tower's size limit is below the built-in program's size.
    pub fn install_default(&mut self, tower: TowerId) -> Result<LogicChanged, LogicError> {
        self.install_bytecode(tower, FORWARD_SOURCE, FORWARD_BYTECODE.to_vec())
    }

    /// Logic of `tower`.
    #[must_use]
    pub fn get(&self, tower: TowerId) -> Option<&LogicHandle> {
        self.handles.get(&tower)
    }

    /// Deployed size of `tower`'s logic.
    #[must_use]
    pub fn logic_size(&self, tower: TowerId) -> Option<usize> {
        self.handles.get(&tower).map(|h| h.bytecode.len())
    }

    /// Drop `tower`'s logic and limit, as when the tower is destroyed.
    pub fn remove(&mut self, tower: TowerId) -> Option<LogicHandle> {
        self.limits.remove(&tower);
        self.handles.remove(&tower)
    }

    /// All handles in tower id order.
    pub fn handles(&self) -> impl Iterator<Item = &LogicHandle> {
        self.handles.values()
    }
}
