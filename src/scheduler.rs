//! Suite scheduler that executes resolved suites against the SUT.
//!
//! Runs each suite's parallel-safe tests under a bounded worker count and
//! the remainder sequentially, bounded by a per-suite timeout, with a
//! per-test exec timeout. Results append into the aggregate as tests
//! complete so partial results survive a stop or timeout.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures_util::stream::{FuturesUnordered, StreamExt};
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::{Event, EventBus};
use crate::models::results::{SessionResults, SuiteResults, TestResult, TestStatus};
use crate::models::suite::{Suite, TestCase};
use crate::sut::{OutputSink, StdoutRedirector, Sut};
use crate::sync::InFlight;
use crate::Result;

/// Scheduler construction parameters.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Overall budget for one suite.
    pub suite_timeout: Duration,
    /// Budget for one test command.
    pub exec_timeout: Duration,
    /// Maximum tests dispatched concurrently.
    pub workers: usize,
    /// Tests whose name matches are excluded from execution.
    pub skip_tests: Option<Regex>,
    /// Treat every test as parallel-safe regardless of its own flag.
    pub force_parallel: bool,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            suite_timeout: Duration::from_secs(3600),
            exec_timeout: Duration::from_secs(3600),
            workers: 1,
            skip_tests: None,
            force_parallel: false,
        }
    }
}

/// Executes suites and accumulates the results aggregate.
pub struct SuiteScheduler {
    sut: Arc<dyn Sut>,
    events: EventBus,
    opts: SchedulerOptions,
    results: Mutex<SessionResults>,
    cancel: Mutex<CancellationToken>,
    active: InFlight,
}

impl SuiteScheduler {
    /// Create a scheduler for the given SUT.
    #[must_use]
    pub fn new(sut: Arc<dyn Sut>, events: EventBus, opts: SchedulerOptions) -> Self {
        Self {
            sut,
            events,
            opts,
            results: Mutex::new(SessionResults::default()),
            cancel: Mutex::new(CancellationToken::new()),
            active: InFlight::new(),
        }
    }

    /// Configured worker count.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.opts.workers
    }

    /// Snapshot of the results aggregate. Non-empty only after at least
    /// one scheduling pass.
    #[must_use]
    pub fn results(&self) -> SessionResults {
        self.with_results(|results| results.clone())
    }

    /// Execute all given suites to completion, suite timeout, or stop.
    ///
    /// # Errors
    ///
    /// Currently infallible at the orchestration level; individual test
    /// failures are recorded in the aggregate, and a stop ends the pass
    /// early with partial results.
    pub async fn schedule(&self, suites: Vec<Suite>) -> Result<()> {
        let _active = self.active.enter();
        let cancel = self.arm_cancel();

        self.with_results(|results| {
            if results.sut.is_empty() {
                results.sut = self.sut.name().to_owned();
            }
        });

        let sink: Arc<dyn OutputSink> = Arc::new(StdoutRedirector::session(
            self.events.clone(),
            self.sut.name(),
        ));

        for suite in suites {
            if cancel.is_cancelled() {
                break;
            }

            info!(suite = %suite.name, tests = suite.tests.len(), "suite started");
            self.events.fire(Event::SuiteStarted {
                suite: suite.name.clone(),
            });

            let idx = self.with_results(|results| {
                results.suites.push(SuiteResults::begin(&suite.name));
                results.suites.len() - 1
            });

            let body = self.run_suite(&suite, idx, &sink);
            let timed = tokio::select! {
                () = cancel.cancelled() => {
                    debug!(suite = %suite.name, "suite interrupted by stop");
                    break;
                }
                timed = tokio::time::timeout(self.opts.suite_timeout, body) => timed,
            };

            if timed.is_err() {
                warn!(suite = %suite.name, "suite timed out");
                self.with_results(|results| {
                    if let Some(record) = results.suites.get_mut(idx) {
                        record.timed_out = true;
                    }
                });
            }
        }

        Ok(())
    }

    /// Cooperative stop: interrupt the current pass and return once
    /// scheduling has ceased. Partial results remain readable.
    pub async fn stop(&self) {
        self.current_cancel().cancel();
        self.active.wait_idle().await;
    }

    async fn run_suite(&self, suite: &Suite, idx: usize, sink: &Arc<dyn OutputSink>) {
        let (parallel, serial): (Vec<&TestCase>, Vec<&TestCase>) = suite
            .tests
            .iter()
            .filter(|test| !self.is_skipped(test))
            .partition(|test| self.opts.force_parallel || test.parallel);

        let mut pending = FuturesUnordered::new();
        let mut queue = parallel.into_iter();

        for test in queue.by_ref().take(self.opts.workers.max(1)) {
            pending.push(self.run_one(&suite.name, test, sink));
        }

        while let Some(result) = pending.next().await {
            if let Some(test) = queue.next() {
                pending.push(self.run_one(&suite.name, test, sink));
            }
            self.record(idx, result);
        }

        for test in serial {
            let result = self.run_one(&suite.name, test, sink).await;
            self.record(idx, result);
        }
    }

    async fn run_one(
        &self,
        suite_name: &str,
        test: &TestCase,
        sink: &Arc<dyn OutputSink>,
    ) -> TestResult {
        debug!(suite = suite_name, test = %test.name, "test started");
        let started = Instant::now();

        let outcome = tokio::time::timeout(
            self.opts.exec_timeout,
            self.sut.run_command(&test.command, Arc::clone(sink)),
        )
        .await;

        let (status, stdout, returncode) = match outcome {
            Ok(Ok(out)) => {
                let status = if out.returncode == 0 {
                    TestStatus::Passed
                } else {
                    TestStatus::Failed
                };
                (status, out.stdout, Some(out.returncode))
            }
            Ok(Err(err)) => {
                warn!(suite = suite_name, test = %test.name, %err, "test broken");
                (TestStatus::Broken, String::new(), None)
            }
            Err(_elapsed) => {
                warn!(suite = suite_name, test = %test.name, "test timed out");
                (TestStatus::TimedOut, String::new(), None)
            }
        };

        TestResult {
            suite: suite_name.to_owned(),
            name: test.name.clone(),
            command: test.command.clone(),
            status,
            stdout,
            returncode,
            duration_seconds: started.elapsed().as_secs_f64(),
        }
    }

    fn is_skipped(&self, test: &TestCase) -> bool {
        let Some(ref skip) = self.opts.skip_tests else {
            return false;
        };
        if skip.is_match(&test.name) {
            debug!(test = %test.name, "test excluded by skip pattern");
            return true;
        }
        false
    }

    fn record(&self, idx: usize, result: TestResult) {
        self.events.fire(Event::TestCompleted {
            result: result.clone(),
        });
        self.with_results(|results| {
            if let Some(record) = results.suites.get_mut(idx) {
                record.tests.push(result);
            }
        });
    }

    fn with_results<T>(&self, f: impl FnOnce(&mut SessionResults) -> T) -> T {
        match self.results.lock() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    fn arm_cancel(&self) -> CancellationToken {
        let fresh = CancellationToken::new();
        match self.cancel.lock() {
            Ok(mut guard) => *guard = fresh.clone(),
            Err(mut poisoned) => **poisoned.get_mut() = fresh.clone(),
        }
        fresh
    }

    fn current_cancel(&self) -> CancellationToken {
        match self.cancel.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
