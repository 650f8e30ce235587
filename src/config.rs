//! Runner configuration parsing and validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use crate::{AppError, Result};

fn default_workers() -> usize {
    1
}

fn default_timeout_seconds() -> u64 {
    3600
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RunnerConfig {
    /// Directory containing suite definition files.
    pub suites_dir: PathBuf,
    /// Working directory for logs and reports; a temporary directory is
    /// used when absent.
    #[serde(default)]
    pub workdir: Option<PathBuf>,
    /// Maximum tests dispatched concurrently by the scheduler.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Overall budget for one suite, in seconds.
    #[serde(default = "default_timeout_seconds")]
    pub suite_timeout_seconds: u64,
    /// Budget for one command or test, in seconds.
    #[serde(default = "default_timeout_seconds")]
    pub exec_timeout_seconds: u64,
    /// Regular expression excluding matching tests from execution.
    #[serde(default)]
    pub skip_tests: Option<String>,
    /// Treat every test as parallel-safe regardless of its own flag.
    #[serde(default)]
    pub force_parallel: bool,
}

impl RunnerConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Budget for one suite.
    #[must_use]
    pub fn suite_timeout(&self) -> Duration {
        Duration::from_secs(self.suite_timeout_seconds)
    }

    /// Budget for one command or test.
    #[must_use]
    pub fn exec_timeout(&self) -> Duration {
        Duration::from_secs(self.exec_timeout_seconds)
    }

    /// Compiled skip pattern, when configured.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] if the pattern is not a valid regex.
    pub fn skip_regex(&self) -> Result<Option<Regex>> {
        self.skip_tests
            .as_deref()
            .map(|pattern| Regex::new(pattern).map_err(AppError::from))
            .transpose()
    }

    fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(AppError::Config("workers must be greater than zero".into()));
        }

        if self.suite_timeout_seconds == 0 || self.exec_timeout_seconds == 0 {
            return Err(AppError::Config("timeouts must be greater than zero".into()));
        }

        // Surface a broken pattern at load time rather than mid-run.
        self.skip_regex()?;

        Ok(())
    }
}
