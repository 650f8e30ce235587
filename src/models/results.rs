//! Results aggregate produced by the scheduler and exported verbatim.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Terminal status of a single test case.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    /// Command exited with code 0.
    Passed,
    /// Command exited with a non-zero code.
    Failed,
    /// Command exceeded the exec timeout.
    TimedOut,
    /// Command could not be executed at all.
    Broken,
}

/// Recorded outcome of one test case.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct TestResult {
    /// Suite the test belongs to.
    pub suite: String,
    /// Test display name.
    pub name: String,
    /// Command that was executed.
    pub command: String,
    /// Terminal status.
    pub status: TestStatus,
    /// Captured stdout.
    pub stdout: String,
    /// Process return code, when the command ran to completion.
    pub returncode: Option<i32>,
    /// Wall-clock execution time in seconds.
    pub duration_seconds: f64,
}

/// Per-suite execution record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct SuiteResults {
    /// Suite name.
    pub name: String,
    /// When the suite began executing.
    pub started_at: DateTime<Utc>,
    /// Whether the suite hit its overall timeout before finishing.
    pub timed_out: bool,
    /// Results of the tests that completed.
    pub tests: Vec<TestResult>,
}

impl SuiteResults {
    /// Start an empty record for a suite.
    #[must_use]
    pub fn begin(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            started_at: Utc::now(),
            timed_out: false,
            tests: Vec::new(),
        }
    }

    /// Number of tests that passed.
    #[must_use]
    pub fn passed(&self) -> usize {
        self.tests
            .iter()
            .filter(|t| t.status == TestStatus::Passed)
            .count()
    }

    /// Number of tests that did not pass.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.tests.len() - self.passed()
    }
}

/// Opaque aggregate accumulated by the scheduler across scheduling passes.
///
/// Read (never mutated) by the session after scheduling completes and
/// exported verbatim.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct SessionResults {
    /// Name of the SUT the results were produced against.
    pub sut: String,
    /// Per-suite records in scheduling order.
    pub suites: Vec<SuiteResults>,
}

impl SessionResults {
    /// Whether any suite work has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.suites.is_empty()
    }

    /// Total number of recorded test results across all suites.
    #[must_use]
    pub fn total_tests(&self) -> usize {
        self.suites.iter().map(|s| s.tests.len()).sum()
    }
}
