//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure, including a session
    /// constructed without its required collaborators.
    Config(String),
    /// Suite name resolution failure (no names given or names unknown).
    Resolution(String),
    /// Ad-hoc command exceeded the exec timeout. Carries the command text.
    CommandTimeout(String),
    /// SUT communication or command execution failure.
    Sut(String),
    /// Suite scheduling failure.
    Scheduler(String),
    /// Results export failure.
    Export(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Resolution(msg) => write!(f, "resolution: {msg}"),
            Self::CommandTimeout(cmd) => write!(f, "command timeout: {cmd:?}"),
            Self::Sut(msg) => write!(f, "sut: {msg}"),
            Self::Scheduler(msg) => write!(f, "scheduler: {msg}"),
            Self::Export(msg) => write!(f, "export: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Export(err.to_string())
    }
}

impl From<regex::Error> for AppError {
    fn from(err: regex::Error) -> Self {
        Self::Config(format!("invalid skip pattern: {err}"))
    }
}
