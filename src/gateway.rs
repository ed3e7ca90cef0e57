//! Compilation gateway: turns tower logic source into a program image.
//!
//! The production compiler is an external service; the engine only sees the
//! [`CompilationGateway`] trait. [`TimedGateway`] bounds every call with a
//! timeout and caps how many calls run at once, and [`ScriptGateway`] is a
//! small in-process compiler used by the command line tool and the tests.

mod script;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

pub use script::{ScriptGateway, compile_script};

/// A compiler rejection.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{}{message}", .line.map(|l| format!("line {l}: ")).unwrap_or_default())]
pub struct CompileError {
    /// What went wrong.
    pub message: String,
    /// 1-based source line, when known.
    pub line: Option<usize>,
}

impl CompileError {
    /// An error tied to a source line.
    #[must_use]
    pub fn at(line: usize, message: impl Into<String>) -> Self {
        CompileError {
            message: message.into(),
            line: Some(line),
        }
    }

    /// An error for the whole source.
    #[must_use]
    pub fn general(message: impl Into<String>) -> Self {
        CompileError {
            message: message.into(),
            line: None,
        }
    }
}

/// Source-to-bytecode compiler.
///
/// Called through [`TimedGateway`], each call runs on its own thread. A call
/// that misses the deadline is abandoned but not interrupted: its thread
/// keeps running until `compile` returns, so implementations should give
/// up on their own within a bounded time.
pub trait CompilationGateway: Send + Sync {
    /// Compile `source` into a flat RV32IM image or a RISC-V ELF.
    ///
    /// # Errors
    ///
    /// [`CompileError`] when the source is rejected.
    fn compile(&self, source: &str) -> Result<Vec<u8>, CompileError>;
}

impl<F> CompilationGateway for F
where
    F: Fn(&str) -> Result<Vec<u8>, CompileError> + Send + Sync,
{
    fn compile(&self, source: &str) -> Result<Vec<u8>, CompileError> {
        self(source)
    }
}

/// Failure of a bounded gateway call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The compiler rejected the source.
    #[error(transparent)]
    Compile(#[from] CompileError),
    /// No answer within the timeout.
    #[error("no answer within {0:?}")]
    Timeout(Duration),
    /// The compiler could not be reached or died mid-call.
    #[error("compiler unavailable: {0}")]
    Unavailable(String),
}

/// Compiler calls running at once when nothing else is configured.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;

/// Runs a gateway call on a worker thread and waits at most `timeout`.
///
/// Clones share one count of running workers. Workers abandoned after a
/// timeout stay in the count until they finish, and once `max_in_flight`
/// are running new calls fail fast with [`GatewayError::Unavailable`]
/// instead of starting another thread.
#[derive(Clone)]
pub struct TimedGateway {
    inner: Arc<dyn CompilationGateway>,
    timeout: Duration,
    max_in_flight: usize,
    in_flight: Arc<AtomicUsize>,
}

/// One slot of the in-flight count, released when the worker ends.
struct Slot(Arc<AtomicUsize>);

impl Drop for Slot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl std::fmt::Debug for TimedGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimedGateway")
            .field("timeout", &self.timeout)
            .field("max_in_flight", &self.max_in_flight)
            .finish_non_exhaustive()
    }
}

impl TimedGateway {
    /// Wrap `inner` with a timeout.
    #[must_use]
    pub fn new(inner: Arc<dyn CompilationGateway>, timeout: Duration) -> Self {
        TimedGateway {
            inner,
            timeout,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Allow at most `max` compiler calls to run at once.
    #[must_use]
    pub fn with_max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight = max;
        self
    }

    /// Workers still running, including abandoned ones.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    fn claim_slot(&self) -> Option<Slot> {
        self.in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max_in_flight).then_some(n + 1)
            })
            .ok()
            .map(|_| Slot(Arc::clone(&self.in_flight)))
    }

    /// The configured timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Compile with a deadline. A worker that outlives the deadline is
    /// detached and its answer discarded; it keeps its in-flight slot until
    /// it returns.
    ///
    /// # Errors
    ///
    /// See [`GatewayError`]. [`GatewayError::Unavailable`] also reports
    /// that every in-flight slot is taken.
    pub fn compile(&self, source: &str) -> Result<Vec<u8>, GatewayError> {
        let Some(slot) = self.claim_slot() else {
            warn!(max_in_flight = self.max_in_flight, "compilation gateway saturated");
            return Err(GatewayError::Unavailable(format!(
                "{} compiler calls still running",
                self.max_in_flight
            )));
        };
        let (tx, rx) = crossbeam_channel::bounded(1);
        let inner = Arc::clone(&self.inner);
        let source = source.to_owned();
        thread::Builder::new()
            .name("rampart-compile".into())
            .spawn(move || {
                let _slot = slot;
                // The receiver is gone after a timeout; nothing to report.
                let _ = tx.send(inner.compile(&source));
            })
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => Ok(result?),
            Err(RecvTimeoutError::Timeout) => {
                warn!(timeout = ?self.timeout, "compilation gateway timed out");
                Err(GatewayError::Timeout(self.timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(GatewayError::Unavailable(
                "compiler worker exited without answering".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_error_display() {
        assert_eq!(CompileError::at(3, "bad token").to_string(), "line 3: bad token");
        assert_eq!(CompileError::general("empty").to_string(), "empty");
    }

    #[test]
    fn test_timed_gateway_passes_results_through() {
        let gateway = TimedGateway::new(Arc::new(ScriptGateway), Duration::from_secs(5));
        assert!(gateway.compile("x = x + 1").is_ok());
        assert!(matches!(
            gateway.compile("x = ("),
            Err(GatewayError::Compile(_))
        ));
    }

    #[test]
    fn test_timed_gateway_times_out() {
        let slow = |_: &str| -> Result<Vec<u8>, CompileError> {
            thread::sleep(Duration::from_millis(500));
            Ok(vec![0x73, 0, 0, 0])
        };
        let gateway = TimedGateway::new(Arc::new(slow), Duration::from_millis(20));
        assert_eq!(
            gateway.compile("anything"),
            Err(GatewayError::Timeout(Duration::from_millis(20)))
        );
    }

    #[test]
    fn test_abandoned_workers_hold_their_slot() {
        let slow = |_: &str| -> Result<Vec<u8>, CompileError> {
            thread::sleep(Duration::from_millis(300));
            Ok(vec![0x73, 0, 0, 0])
        };
        let gateway =
            TimedGateway::new(Arc::new(slow), Duration::from_millis(10)).with_max_in_flight(1);
        assert_eq!(
            gateway.compile("first"),
            Err(GatewayError::Timeout(Duration::from_millis(10)))
        );
        assert_eq!(gateway.in_flight(), 1);
        assert!(matches!(
            gateway.clone().compile("second"),
            Err(GatewayError::Unavailable(_))
        ));

        // The slot comes back once the abandoned call returns.
        thread::sleep(Duration::from_millis(600));
        assert_eq!(gateway.in_flight(), 0);
        assert_eq!(
            gateway.compile("third"),
            Err(GatewayError::Timeout(Duration::from_millis(10)))
        );
    }

    #[test]
    fn test_panicking_compiler_is_unavailable() {
        let broken = |_: &str| -> Result<Vec<u8>, CompileError> { panic!("compiler crashed") };
        let gateway = TimedGateway::new(Arc::new(broken), Duration::from_secs(5));
        assert!(matches!(
            gateway.compile("x = 1"),
            Err(GatewayError::Unavailable(_))
        ));
    }
}
