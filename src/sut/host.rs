//! Local host SUT that executes commands as child processes.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::sut::{CommandOutcome, OutputSink, Sut};
use crate::{AppError, Result};

/// SUT implementation that runs commands on the local machine via
/// `sh -c`, streaming stdout lines into the caller's sink.
///
/// Children are spawned with `kill_on_drop(true)` so an abandoned command
/// future (e.g. one dropped by a deadline) cannot leak a process.
pub struct HostSut {
    name: String,
    parallel: bool,
    running: AtomicBool,
    // Re-armed on every communicate; cancelled by stop to interrupt
    // in-flight commands.
    cancel: Mutex<CancellationToken>,
}

impl HostSut {
    /// Create a host SUT supporting parallel test execution.
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: "host".into(),
            parallel: true,
            running: AtomicBool::new(false),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Override the parallel-execution capability flag.
    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    fn current_cancel(&self) -> CancellationToken {
        match self.cancel.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn arm_cancel(&self) {
        match self.cancel.lock() {
            Ok(mut guard) => *guard = CancellationToken::new(),
            Err(mut poisoned) => **poisoned.get_mut() = CancellationToken::new(),
        }
    }

    async fn run_command_inner(
        &self,
        command: &str,
        sink: Arc<dyn OutputSink>,
    ) -> Result<CommandOutcome> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(AppError::Sut("host sut is not communicating".into()));
        }

        let cancel = self.current_cancel();

        // stderr is routed into the stdout pipe inside the shell so
        // diagnostics from failing commands end up in the captured output.
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(format!("exec 2>&1; {command}"))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| AppError::Sut(format!("failed to spawn command: {err}")))?;

        debug!(command, pid = child.id().unwrap_or(0), "command spawned");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Sut("child stdout was not captured".into()))?;
        let mut lines = BufReader::new(stdout).lines();
        let mut collected = String::new();

        let read = async {
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        sink.write(&line);
                        collected.push_str(&line);
                        collected.push('\n');
                    }
                    Ok(None) => break Ok(()),
                    Err(err) => {
                        break Err(AppError::Sut(format!("failed to read stdout: {err}")))
                    }
                }
            }
        };

        tokio::select! {
            () = cancel.cancelled() => {
                if let Err(err) = child.kill().await {
                    warn!(command, %err, "failed to kill interrupted command");
                }
                return Err(AppError::Sut(format!(
                    "command interrupted by stop: {command:?}"
                )));
            }
            res = read => res?,
        }

        let status = tokio::select! {
            () = cancel.cancelled() => {
                if let Err(err) = child.kill().await {
                    warn!(command, %err, "failed to kill interrupted command");
                }
                return Err(AppError::Sut(format!(
                    "command interrupted by stop: {command:?}"
                )));
            }
            status = child.wait() => status
                .map_err(|err| AppError::Sut(format!("failed to wait for command: {err}")))?,
        };

        Ok(CommandOutcome {
            stdout: collected,
            returncode: status.code().unwrap_or(-1),
        })
    }
}

impl Default for HostSut {
    fn default() -> Self {
        Self::new()
    }
}

impl Sut for HostSut {
    fn name(&self) -> &str {
        &self.name
    }

    fn parallel_execution(&self) -> bool {
        self.parallel
    }

    fn is_running(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(async move { self.running.load(Ordering::SeqCst) })
    }

    fn ensure_communicate(
        &self,
        _sink: Arc<dyn OutputSink>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            if self.running.swap(true, Ordering::SeqCst) {
                debug!("host sut already communicating");
                return Ok(());
            }

            self.arm_cancel();
            info!("host sut communicating");
            Ok(())
        })
    }

    fn stop(
        &self,
        _sink: Arc<dyn OutputSink>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            if !self.running.swap(false, Ordering::SeqCst) {
                return Ok(());
            }

            self.current_cancel().cancel();
            info!("host sut stopped");
            Ok(())
        })
    }

    fn run_command(
        &self,
        command: &str,
        sink: Arc<dyn OutputSink>,
    ) -> Pin<Box<dyn Future<Output = Result<CommandOutcome>> + Send + '_>> {
        let command = command.to_owned();
        Box::pin(async move { self.run_command_inner(&command, sink).await })
    }
}
