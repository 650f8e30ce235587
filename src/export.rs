//! Durable persistence of the results aggregate.

use std::path::Path;

use tracing::info;

use crate::models::results::SessionResults;
use crate::{AppError, Result};

/// Writes the results aggregate to disk as pretty-printed JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonExporter;

impl JsonExporter {
    /// Create an exporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Durably persist `results` to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Export`] on serialization or write failure.
    pub async fn save_file(&self, results: &SessionResults, path: &Path) -> Result<()> {
        let body = serde_json::to_vec_pretty(results)?;

        tokio::fs::write(path, body)
            .await
            .map_err(|err| AppError::Export(format!("cannot write {}: {err}", path.display())))?;

        info!(
            path = %path.display(),
            suites = results.suites.len(),
            tests = results.total_tests(),
            "results exported"
        );
        Ok(())
    }
}
