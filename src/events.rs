//! Fire-and-forget lifecycle event bus.
//!
//! The [`EventBus`] is injected into the session at construction so the
//! orchestrator never owns global state. Delivery is best-effort: firing
//! never blocks the caller, and a listener that lags or disappears cannot
//! abort the orchestrator.

use std::path::PathBuf;

use tokio::sync::broadcast;
use tracing::debug;

use crate::models::results::{SessionResults, TestResult};

const BUS_CAPACITY: usize = 256;

/// Lifecycle and output events emitted by the session, scheduler, and SUT
/// redirectors.
#[derive(Debug, Clone)]
pub enum Event {
    /// A session run began. Carries the working directory path.
    SessionStarted {
        /// Working directory for this run.
        path: PathBuf,
    },
    /// The session terminated via the stop path.
    SessionStopped,
    /// The session completed and results were exported.
    SessionCompleted {
        /// Snapshot of the results aggregate at completion time.
        results: SessionResults,
    },
    /// The session hit an orchestration-level error.
    SessionError {
        /// Human-readable error message.
        message: String,
    },
    /// The SUT connection is being established.
    SutStarting {
        /// SUT display name.
        sut: String,
    },
    /// The SUT connection is being torn down.
    SutStopping {
        /// SUT display name.
        sut: String,
    },
    /// A raw stdout line from the SUT outside command mode.
    SutStdout {
        /// SUT display name.
        sut: String,
        /// Output line.
        line: String,
    },
    /// An ad-hoc command is about to run.
    CommandStarted {
        /// Command text.
        command: String,
    },
    /// A stdout line produced by an in-flight ad-hoc command.
    CommandStdout {
        /// Output line.
        line: String,
    },
    /// An ad-hoc command finished.
    CommandCompleted {
        /// Command text.
        command: String,
        /// Captured stdout.
        stdout: String,
        /// Process return code.
        returncode: i32,
    },
    /// The scheduler began executing a suite.
    SuiteStarted {
        /// Suite name.
        suite: String,
    },
    /// A single test case finished.
    TestCompleted {
        /// The recorded result.
        result: TestResult,
    },
}

/// Broadcast fan-out channel for [`Event`]s.
///
/// Cloning the bus is cheap; all clones feed the same set of subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a bus with the default buffer capacity.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Fire an event to all current subscribers.
    ///
    /// Never blocks. An event fired with no subscribers is dropped.
    pub fn fire(&self, event: Event) {
        if self.tx.send(event).is_err() {
            debug!("event fired with no subscribers");
        }
    }

    /// Subscribe to all events fired after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
