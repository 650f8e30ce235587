#![forbid(unsafe_code)]

//! `testrig` binary: configure and run a test session from the CLI.
//!
//! Loads configuration, sets up logging (console plus a `debug.log` file
//! under the working directory), builds a host SUT session, and runs it.
//! Ctrl-C triggers a cooperative session stop.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use testrig::config::RunnerConfig;
use testrig::framework::TomlFramework;
use testrig::session::{RunOptions, Session};
use testrig::sut::host::HostSut;
use testrig::workdir::RunDir;
use testrig::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "testrig", about = "Test-session orchestrator", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Suite names to execute.
    suites: Vec<String>,

    /// Single command to run before any suites.
    #[arg(long)]
    command: Option<String>,

    /// Additional JSON report path.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Override the working directory from the config file.
    #[arg(long)]
    workdir: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();

    let config = RunnerConfig::load_from_path(&args.config)?;

    let workdir = match args.workdir.clone().or_else(|| config.workdir.clone()) {
        Some(path) => RunDir::persistent(path)?,
        None => RunDir::temporary()?,
    };

    init_tracing(args.log_format, &workdir)?;
    info!(workdir = %workdir.path().display(), "testrig bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args, &config, workdir))
}

async fn run(args: Cli, config: &RunnerConfig, workdir: RunDir) -> Result<()> {
    let sut = Arc::new(HostSut::new());
    let framework = Arc::new(TomlFramework::new(config.suites_dir.clone()));

    let session = Arc::new(
        Session::builder()
            .workdir(workdir)
            .framework(framework)
            .sut(sut)
            .exec_timeout(config.exec_timeout())
            .suite_timeout(config.suite_timeout())
            .workers(config.workers)
            .skip_tests(config.skip_regex()?)
            .force_parallel(config.force_parallel)
            .build()?,
    );

    let opts = RunOptions {
        command: args.command,
        suites: args.suites,
        report_path: args.report,
    };

    let run_session = Arc::clone(&session);
    let mut run_task = tokio::spawn(async move { run_session.run(opts).await });

    tokio::select! {
        res = &mut run_task => {
            return res.map_err(|err| AppError::Scheduler(format!("run task panicked: {err}")))?;
        }
        () = shutdown_signal() => {
            info!("interrupt received, stopping session");
            if let Err(err) = session.stop().await {
                error!(%err, "session stop failed");
            }
        }
    }

    // The stop has drained the run; collect its outcome.
    match run_task.await {
        Ok(res) => res,
        Err(err) => Err(AppError::Scheduler(format!("run task panicked: {err}"))),
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

/// Install the console subscriber plus a DEBUG-level file layer writing
/// `debug.log` under the working directory.
///
/// Subscribers are process-global, so this runs once at bootstrap rather
/// than inside session construction.
fn init_tracing(log_format: LogFormat, workdir: &RunDir) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let debug_file = std::fs::File::create(workdir.debug_log_path())
        .map_err(|err| AppError::Io(format!("cannot create debug.log: {err}")))?;
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(Arc::new(debug_file))
        .with_ansi(false)
        .with_filter(LevelFilter::DEBUG);

    let registry = tracing_subscriber::registry().with(file_layer);

    let init = match log_format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_filter(env_filter))
            .try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_filter(env_filter))
            .try_init(),
    };

    init.map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))
}
