#![forbid(unsafe_code)]

//! Test-session orchestration for a system under test (SUT).
//!
//! The crate is built around [`session::Session`], which sequences SUT
//! startup, optional ad-hoc command execution, and scheduled suite
//! execution, while remaining interruptible by a concurrent
//! [`session::Session::stop`] and guaranteeing that partial results are
//! exported on every exit path.

pub mod config;
pub mod errors;
pub mod events;
pub mod export;
pub mod framework;
pub mod models;
pub mod scheduler;
pub mod session;
pub mod sut;
pub(crate) mod sync;
pub mod workdir;

pub use config::RunnerConfig;
pub use errors::{AppError, Result};
