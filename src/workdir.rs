//! Working directory handle for a session run.

use std::path::{Path, PathBuf};

use crate::Result;

/// Filesystem location owning a session's debug log and default report
/// output.
///
/// Either a caller-supplied persistent directory or a temporary one that
/// lives as long as the handle.
pub struct RunDir {
    path: PathBuf,
    // Kept alive so the directory is removed when the handle drops.
    _temp: Option<tempfile::TempDir>,
}

impl RunDir {
    /// Use (and create if needed) a persistent directory.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`](crate::AppError::Io) if the directory cannot be created.
    pub fn persistent(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        std::fs::create_dir_all(&path)?;
        Ok(Self { path, _temp: None })
    }

    /// Create a temporary directory removed when the handle drops.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`](crate::AppError::Io) if the directory cannot be created.
    pub fn temporary() -> Result<Self> {
        let temp = tempfile::Builder::new().prefix("testrig-").tempdir()?;
        Ok(Self {
            path: temp.path().to_path_buf(),
            _temp: Some(temp),
        })
    }

    /// Absolute path of the directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Default results file path (`results.json`).
    #[must_use]
    pub fn results_path(&self) -> PathBuf {
        self.path.join("results.json")
    }

    /// Debug log file path (`debug.log`).
    #[must_use]
    pub fn debug_log_path(&self) -> PathBuf {
        self.path.join("debug.log")
    }
}
