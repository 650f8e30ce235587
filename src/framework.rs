//! Suite resolution framework abstraction.
//!
//! A [`Framework`] resolves a suite identifier into an executable
//! [`Suite`] description for a given SUT. The session treats suites as
//! opaque values; only the framework understands where they come from.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use crate::models::suite::{Suite, TestCase};
use crate::sut::Sut;
use crate::{AppError, Result};

/// Resolves suite names to suite descriptions.
pub trait Framework: Send + Sync {
    /// Framework display name used for logging.
    fn name(&self) -> &str;

    /// Resolve one suite name for the given SUT.
    ///
    /// Returns `Ok(None)` when the name is unknown; the caller decides how
    /// to report that.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Resolution`](crate::AppError::Resolution) if the
    /// suite exists but cannot be read or parsed.
    fn find_suite(
        &self,
        sut: Arc<dyn Sut>,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Suite>>> + Send + '_>>;
}

/// On-disk suite definition file.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
struct SuiteFile {
    #[serde(default)]
    tests: Vec<TestCase>,
}

/// Framework that resolves suite names to TOML definition files under a
/// suites directory: `<dir>/<name>.toml`.
pub struct TomlFramework {
    dir: PathBuf,
}

impl TomlFramework {
    /// Create a framework rooted at the given suites directory.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    async fn load_suite(&self, name: &str) -> Result<Option<Suite>> {
        // Suite names map directly to file names; reject path separators.
        if name.contains('/') || name.contains("..") {
            return Err(AppError::Resolution(format!(
                "invalid suite name: {name:?}"
            )));
        }

        let path = self.dir.join(format!("{name}.toml"));
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(suite = name, path = %path.display(), "suite file not found");
                return Ok(None);
            }
            Err(err) => {
                return Err(AppError::Resolution(format!(
                    "cannot read suite {name:?}: {err}"
                )));
            }
        };

        let file: SuiteFile = toml::from_str(&raw)
            .map_err(|err| AppError::Resolution(format!("invalid suite {name:?}: {err}")))?;

        Ok(Some(Suite::new(name, file.tests)))
    }
}

impl Framework for TomlFramework {
    fn name(&self) -> &str {
        "toml"
    }

    fn find_suite(
        &self,
        _sut: Arc<dyn Sut>,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Suite>>> + Send + '_>> {
        let name = name.to_owned();
        Box::pin(async move { self.load_suite(&name).await })
    }
}
