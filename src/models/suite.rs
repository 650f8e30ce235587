//! Suite and test-case models.

use serde::{Deserialize, Serialize};

/// A single test case inside a suite.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TestCase {
    /// Test display name, unique within its suite.
    pub name: String,
    /// Shell command executed on the SUT.
    pub command: String,
    /// Whether the test may run alongside other tests.
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

fn default_parallel() -> bool {
    true
}

/// A named collection of test cases resolved by the framework.
///
/// The session never interprets suite contents; it only hands resolved
/// suites to the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Suite {
    /// Suite name as requested by the caller.
    pub name: String,
    /// Test cases in declaration order.
    #[serde(default)]
    pub tests: Vec<TestCase>,
}

impl Suite {
    /// Construct a suite from a name and its test cases.
    #[must_use]
    pub fn new(name: impl Into<String>, tests: Vec<TestCase>) -> Self {
        Self {
            name: name.into(),
            tests,
        }
    }

    /// Whether the suite contains no test cases.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }
}
