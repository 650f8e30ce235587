//! SUT (system under test) capability abstraction.
//!
//! The [`Sut`] trait decouples the session and scheduler from the concrete
//! execution target (local host, SSH, virtual machine). All orchestrator
//! operations that touch the target route through this trait.

pub mod host;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::events::{Event, EventBus};
use crate::Result;

/// Outcome of a single command executed on a SUT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    /// Captured stdout (stderr is merged into it).
    pub stdout: String,
    /// Process return code.
    pub returncode: i32,
}

/// Sink for raw output lines produced by a SUT.
///
/// Implementations must never block the producer; dropping output is
/// preferable to stalling command execution.
pub trait OutputSink: Send + Sync {
    /// Consume one output line.
    fn write(&self, line: &str);
}

/// Communication interface to an execution target.
///
/// Implementations provide transport-specific connection handling while
/// exposing a uniform surface to the session and the scheduler.
pub trait Sut: Send + Sync {
    /// Static display name used for logging and events.
    fn name(&self) -> &str;

    /// Whether the target supports concurrent test execution.
    ///
    /// When this returns `false` the session downgrades the scheduler to a
    /// single worker.
    fn parallel_execution(&self) -> bool;

    /// Current liveness of the connection.
    fn is_running(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>>;

    /// Establish communication with the target. Idempotent: calling on an
    /// already-connected SUT is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Sut`](crate::AppError::Sut) if the connection
    /// cannot be established.
    fn ensure_communicate(
        &self,
        sink: Arc<dyn OutputSink>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Terminate the connection and interrupt any in-flight command.
    ///
    /// Callers check [`Sut::is_running`] first; implementations should
    /// still tolerate a stop on a non-running target.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Sut`](crate::AppError::Sut) if teardown fails.
    fn stop(
        &self,
        sink: Arc<dyn OutputSink>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Execute one shell command, streaming output through `sink`.
    ///
    /// May be interrupted by an external deadline or by [`Sut::stop`].
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Sut`](crate::AppError::Sut) if the command
    /// cannot be executed or is interrupted by a stop.
    fn run_command(
        &self,
        command: &str,
        sink: Arc<dyn OutputSink>,
    ) -> Pin<Box<dyn Future<Output = Result<CommandOutcome>> + Send + '_>>;
}

/// Forwards a SUT's raw output stream into the event bus as structured
/// events.
///
/// In command mode lines become [`Event::CommandStdout`]; otherwise they
/// become [`Event::SutStdout`] tagged with the SUT name.
pub struct StdoutRedirector {
    events: EventBus,
    sut_name: String,
    is_command: bool,
}

impl StdoutRedirector {
    /// Redirector for connection-lifecycle output.
    #[must_use]
    pub fn session(events: EventBus, sut_name: impl Into<String>) -> Self {
        Self {
            events,
            sut_name: sut_name.into(),
            is_command: false,
        }
    }

    /// Redirector for ad-hoc command output.
    #[must_use]
    pub fn command(events: EventBus, sut_name: impl Into<String>) -> Self {
        Self {
            events,
            sut_name: sut_name.into(),
            is_command: true,
        }
    }
}

impl OutputSink for StdoutRedirector {
    fn write(&self, line: &str) {
        if self.is_command {
            self.events.fire(Event::CommandStdout {
                line: line.to_owned(),
            });
        } else {
            self.events.fire(Event::SutStdout {
                sut: self.sut_name.clone(),
                line: line.to_owned(),
            });
        }
    }
}

/// Sink that discards all output. Used where no listener is interested.
pub struct NullSink;

impl OutputSink for NullSink {
    fn write(&self, _line: &str) {}
}
