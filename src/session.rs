//! Session orchestrator: the run / stop state machine.
//!
//! A [`Session`] sequences SUT startup, optional ad-hoc command execution,
//! and suite scheduling, and guarantees that results are exported and the
//! SUT is stopped on every exit path. [`Session::stop`] may be invoked
//! concurrently with [`Session::run`] and does not return until all
//! in-flight work has observed the stop and exited.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventBus};
use crate::export::JsonExporter;
use crate::framework::Framework;
use crate::models::suite::Suite;
use crate::scheduler::{SchedulerOptions, SuiteScheduler};
use crate::sut::{OutputSink, StdoutRedirector, Sut};
use crate::sync::InFlight;
use crate::workdir::RunDir;
use crate::{AppError, Result};

/// Arguments for one [`Session::run`] invocation.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Single ad-hoc command to execute before any suites.
    pub command: Option<String>,
    /// Suite names to resolve and schedule. Empty means no suite phase.
    pub suites: Vec<String>,
    /// Optional second report location, in addition to the default
    /// `results.json` under the working directory.
    pub report_path: Option<PathBuf>,
}

/// Builder for [`Session`]. Working directory, framework, and SUT are
/// mandatory; everything else has kirk-compatible defaults.
pub struct SessionBuilder {
    workdir: Option<RunDir>,
    framework: Option<Arc<dyn Framework>>,
    sut: Option<Arc<dyn Sut>>,
    events: EventBus,
    exec_timeout: Duration,
    suite_timeout: Duration,
    workers: usize,
    skip_tests: Option<Regex>,
    force_parallel: bool,
}

impl SessionBuilder {
    /// Start a builder with default timeouts and a single worker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            workdir: None,
            framework: None,
            sut: None,
            events: EventBus::new(),
            exec_timeout: Duration::from_secs(3600),
            suite_timeout: Duration::from_secs(3600),
            workers: 1,
            skip_tests: None,
            force_parallel: false,
        }
    }

    /// Set the working directory handle.
    #[must_use]
    pub fn workdir(mut self, workdir: RunDir) -> Self {
        self.workdir = Some(workdir);
        self
    }

    /// Set the suite resolution framework.
    #[must_use]
    pub fn framework(mut self, framework: Arc<dyn Framework>) -> Self {
        self.framework = Some(framework);
        self
    }

    /// Set the SUT. The reference is shared, not owned; its lifetime
    /// exceeds the session.
    #[must_use]
    pub fn sut(mut self, sut: Arc<dyn Sut>) -> Self {
        self.sut = Some(sut);
        self
    }

    /// Use an externally created event bus.
    #[must_use]
    pub fn events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Budget for one ad-hoc command or test.
    #[must_use]
    pub fn exec_timeout(mut self, timeout: Duration) -> Self {
        self.exec_timeout = timeout;
        self
    }

    /// Overall budget for one suite.
    #[must_use]
    pub fn suite_timeout(mut self, timeout: Duration) -> Self {
        self.suite_timeout = timeout;
        self
    }

    /// Requested scheduler worker count.
    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Exclude tests whose name matches the pattern.
    #[must_use]
    pub fn skip_tests(mut self, pattern: Option<Regex>) -> Self {
        self.skip_tests = pattern;
        self
    }

    /// Treat every test as parallel-safe.
    #[must_use]
    pub fn force_parallel(mut self, force: bool) -> Self {
        self.force_parallel = force;
        self
    }

    /// Build the session and its owned scheduler.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] when the working directory, framework,
    /// or SUT is absent.
    pub fn build(self) -> Result<Session> {
        let workdir = self
            .workdir
            .ok_or_else(|| AppError::Config("working directory is empty".into()))?;
        let framework = self
            .framework
            .ok_or_else(|| AppError::Config("framework is empty".into()))?;
        let sut = self
            .sut
            .ok_or_else(|| AppError::Config("sut is empty".into()))?;

        let mut workers = self.workers.max(1);
        if !sut.parallel_execution() && workers > 1 {
            info!(
                sut = sut.name(),
                "SUT doesn't support parallel execution, forcing workers=1"
            );
            workers = 1;
        }

        let scheduler = SuiteScheduler::new(
            Arc::clone(&sut),
            self.events.clone(),
            SchedulerOptions {
                suite_timeout: self.suite_timeout,
                exec_timeout: self.exec_timeout,
                workers,
                skip_tests: self.skip_tests,
                force_parallel: self.force_parallel,
            },
        );

        Ok(Session {
            workdir,
            framework,
            sut,
            events: self.events,
            exec_timeout: self.exec_timeout,
            stopping: AtomicBool::new(false),
            run_lock: tokio::sync::Mutex::new(()),
            exec_lock: tokio::sync::Mutex::new(()),
            scheduler,
            in_flight: InFlight::new(),
            cancel: std::sync::Mutex::new(CancellationToken::new()),
        })
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The session runner.
pub struct Session {
    workdir: RunDir,
    framework: Arc<dyn Framework>,
    sut: Arc<dyn Sut>,
    events: EventBus,
    exec_timeout: Duration,
    stopping: AtomicBool,
    // Serializes whole-session runs.
    run_lock: tokio::sync::Mutex<()>,
    // Serializes ad-hoc command execution.
    exec_lock: tokio::sync::Mutex<()>,
    scheduler: SuiteScheduler,
    in_flight: InFlight,
    // Cancellation context for the current run; re-armed per run and
    // cancelled by stop.
    cancel: std::sync::Mutex<CancellationToken>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("sut", &self.sut.name())
            .field("workdir", &self.workdir.path())
            .field("stopping", &self.stopping)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Start building a session.
    #[must_use]
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// The scheduler owned by this session.
    #[must_use]
    pub fn scheduler(&self) -> &SuiteScheduler {
        &self.scheduler
    }

    /// The session's working directory.
    #[must_use]
    pub fn workdir(&self) -> &RunDir {
        &self.workdir
    }

    /// Run a new session pass and store results inside a JSON file.
    ///
    /// Acquires the run lock for its entire body, so concurrent calls on
    /// the same session fully serialize. Cancellation by a concurrent
    /// [`Session::stop`] is a normal termination path, not an error.
    ///
    /// # Errors
    ///
    /// Propagates resolution, command, scheduling, and export failures
    /// raised while the session is not stopping. Errors raised while the
    /// session is stopping are expected and swallowed, except export
    /// failures, which are always reported.
    pub async fn run(&self, opts: RunOptions) -> Result<()> {
        let RunOptions {
            command,
            suites,
            report_path,
        } = opts;

        let _run = self.run_lock.lock().await;
        let _active = self.in_flight.enter();
        let cancel = self.arm_cancel();

        self.events.fire(Event::SessionStarted {
            path: self.workdir.path().to_path_buf(),
        });

        let body = async {
            self.start_sut().await?;

            if let Some(ref command) = command {
                self.exec_command(command).await?;
            }

            if !suites.is_empty() {
                let resolved = self.resolve_suites(&suites).await?;
                self.scheduler.schedule(resolved).await?;
            }

            Ok::<(), AppError>(())
        };

        let outcome = match cancel.run_until_cancelled(body).await {
            None => {
                // A concurrent stop cancelled the run mid-flight.
                self.events.fire(Event::SessionStopped);
                Ok(())
            }
            Some(Ok(())) => Ok(()),
            Some(Err(err)) => {
                if self.is_stopping() {
                    debug!(%err, "run failed during stop, suppressed");
                    Ok(())
                } else {
                    error!(%err, "session run failed");
                    self.events.fire(Event::SessionError {
                        message: err.to_string(),
                    });
                    Err(err)
                }
            }
        };

        // Guaranteed cleanup: persist whatever results exist, then stop
        // the scheduler and the SUT before returning.
        let exported = self.export_results(report_path.as_deref()).await;
        let stopped = self.inner_stop().await;

        exported.and(outcome).and(stopped)
    }

    /// Stop the current session.
    ///
    /// Sets the stopping flag, cancels the in-flight run, stops the
    /// scheduler and the SUT, then waits until all in-flight run/command
    /// activity has drained before firing [`Event::SessionStopped`] and
    /// clearing the flag.
    ///
    /// # Errors
    ///
    /// Returns the SUT stop failure, if any; the stopped event fires and
    /// the flag clears regardless.
    pub async fn stop(&self) -> Result<()> {
        self.stopping.store(true, Ordering::SeqCst);
        self.current_cancel().cancel();

        let res = self.inner_stop().await;

        // Rendezvous: waiting for the gauge to drain proves every
        // in-flight run or command has observed the stop and exited.
        self.in_flight.wait_idle().await;

        self.events.fire(Event::SessionStopped);
        self.stopping.store(false, Ordering::SeqCst);
        res
    }

    /// Execute a single ad-hoc command on the SUT.
    ///
    /// Serializes with any other ad-hoc command behind the exec lock and
    /// runs under the session's exec timeout.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::CommandTimeout`] carrying the command text on
    /// deadline expiry, always reported, even during a stop. Any other
    /// failure is suppressed when the session is stopping and propagated
    /// otherwise.
    pub async fn exec_command(&self, command: &str) -> Result<()> {
        let _exec = self.exec_lock.lock().await;
        let _active = self.in_flight.enter();

        self.events.fire(Event::CommandStarted {
            command: command.to_owned(),
        });

        let sink: Arc<dyn OutputSink> = Arc::new(StdoutRedirector::command(
            self.events.clone(),
            self.sut.name(),
        ));

        match tokio::time::timeout(self.exec_timeout, self.sut.run_command(command, sink)).await {
            Ok(Ok(outcome)) => {
                self.events.fire(Event::CommandCompleted {
                    command: command.to_owned(),
                    stdout: outcome.stdout,
                    returncode: outcome.returncode,
                });
                Ok(())
            }
            Ok(Err(err)) => {
                if self.is_stopping() {
                    debug!(command, %err, "command failed during stop, suppressed");
                    Ok(())
                } else {
                    Err(err)
                }
            }
            Err(_elapsed) => Err(AppError::CommandTimeout(command.to_owned())),
        }
    }

    /// Resolve each suite name concurrently via the framework.
    ///
    /// All resolutions are attempted even if one fails; the first error
    /// encountered after all complete is surfaced.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Resolution`] when the name list is empty or any
    /// name yields no suite (or an empty one).
    pub async fn resolve_suites(&self, names: &[String]) -> Result<Vec<Suite>> {
        if names.is_empty() {
            return Err(AppError::Resolution("no suite names given".into()));
        }

        let lookups = names
            .iter()
            .map(|name| self.framework.find_suite(Arc::clone(&self.sut), name));
        let resolved = futures_util::future::join_all(lookups).await;

        let mut suites = Vec::with_capacity(names.len());
        let mut first_err = None;
        for (name, outcome) in names.iter().zip(resolved) {
            match outcome {
                Ok(Some(suite)) if !suite.is_empty() => suites.push(suite),
                Ok(_) => {
                    debug!(suite = %name, "suite missing or empty");
                    if first_err.is_none() {
                        first_err = Some(AppError::Resolution(format!(
                            "cannot find suites: {names:?}"
                        )));
                    }
                }
                Err(err) => {
                    debug!(suite = %name, %err, "suite resolution failed");
                    if first_err.is_none() {
                        first_err = Some(err);
                    }
                }
            }
        }

        if let Some(err) = first_err {
            return Err(err);
        }
        Ok(suites)
    }

    async fn start_sut(&self) -> Result<()> {
        self.events.fire(Event::SutStarting {
            sut: self.sut.name().to_owned(),
        });
        self.sut.ensure_communicate(self.session_sink()).await
    }

    async fn stop_sut(&self) -> Result<()> {
        if !self.sut.is_running().await {
            return Ok(());
        }

        self.events.fire(Event::SutStopping {
            sut: self.sut.name().to_owned(),
        });
        self.sut.stop(self.session_sink()).await
    }

    /// Best-effort compound stop: scheduler first, then the SUT.
    async fn inner_stop(&self) -> Result<()> {
        self.scheduler.stop().await;

        self.stop_sut().await.map_err(|err| {
            warn!(%err, "failed to stop sut");
            err
        })
    }

    async fn export_results(&self, report_path: Option<&Path>) -> Result<()> {
        let results = self.scheduler.results();
        if results.is_empty() {
            return Ok(());
        }

        let exporter = JsonExporter::new();
        let default_path = self.workdir.results_path();

        let saved = match report_path.filter(|path| *path != default_path) {
            Some(report) => futures_util::future::try_join(
                exporter.save_file(&results, &default_path),
                exporter.save_file(&results, report),
            )
            .await
            .map(|_| ()),
            None => exporter.save_file(&results, &default_path).await,
        };

        match saved {
            Ok(()) => {
                self.events.fire(Event::SessionCompleted { results });
                Ok(())
            }
            Err(err) => {
                error!(%err, "results export failed");
                self.events.fire(Event::SessionError {
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    fn session_sink(&self) -> Arc<dyn OutputSink> {
        Arc::new(StdoutRedirector::session(
            self.events.clone(),
            self.sut.name(),
        ))
    }

    fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    fn arm_cancel(&self) -> CancellationToken {
        let token = CancellationToken::new();
        match self.cancel.lock() {
            Ok(mut guard) => *guard = token.clone(),
            Err(mut poisoned) => **poisoned.get_mut() = token.clone(),
        }
        // Recheck only after publishing the token. A stop that sets the
        // flag before this load is caught here; a stop that sets it after
        // cancels the token published above. Either way a run beginning
        // while a stop is in progress takes the stop path.
        if self.is_stopping() {
            token.cancel();
        }
        token
    }

    fn current_cancel(&self) -> CancellationToken {
        match self.cancel.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
