//! Integration tests for the session run lifecycle.
//!
//! Validates:
//! - construction fails without its mandatory collaborators
//! - a bare run performs only SUT start/stop
//! - resolution failures abort the run without writing results
//! - command timeouts carry the command text
//! - results are exported once, plus an identical report copy
//! - sequential runs fully serialize
//! - the worker downgrade for non-parallel SUTs

use std::sync::Arc;
use std::time::Duration;

use testrig::errors::AppError;
use testrig::events::{Event, EventBus};
use testrig::models::results::SessionResults;
use testrig::session::{RunOptions, Session};
use testrig::workdir::RunDir;

use super::test_helpers::{
    count_events, drain_events, suite_of, Behavior, FakeFramework, FakeSut,
};

fn build_session(
    sut: Arc<FakeSut>,
    framework: FakeFramework,
    events: EventBus,
    exec_timeout: Duration,
) -> Session {
    Session::builder()
        .workdir(RunDir::temporary().expect("tempdir"))
        .framework(Arc::new(framework))
        .sut(sut)
        .events(events)
        .exec_timeout(exec_timeout)
        .suite_timeout(Duration::from_secs(10))
        .workers(2)
        .build()
        .expect("session builds")
}

#[test]
fn builder_requires_all_collaborators() {
    let err = Session::builder().build().expect_err("missing workdir");
    assert!(matches!(err, AppError::Config(_)));

    let err = Session::builder()
        .workdir(RunDir::temporary().expect("tempdir"))
        .build()
        .expect_err("missing framework");
    assert!(matches!(err, AppError::Config(_)));

    let err = Session::builder()
        .workdir(RunDir::temporary().expect("tempdir"))
        .framework(Arc::new(FakeFramework::new()))
        .build()
        .expect_err("missing sut");
    assert!(matches!(err, AppError::Config(_)));
}

#[tokio::test]
async fn session_debug_names_its_collaborators() {
    let session = build_session(
        Arc::new(FakeSut::new()),
        FakeFramework::new(),
        EventBus::new(),
        Duration::from_secs(5),
    );

    let rendered = format!("{session:?}");
    assert!(rendered.starts_with("Session"));
    assert!(rendered.contains("fake"), "SUT name appears in debug output");
}

#[tokio::test]
async fn bare_run_only_starts_and_stops_sut() {
    let events = EventBus::new();
    let mut rx = events.subscribe();
    let sut = Arc::new(FakeSut::new());
    let session = build_session(
        Arc::clone(&sut),
        FakeFramework::new(),
        events,
        Duration::from_secs(5),
    );

    session.run(RunOptions::default()).await.expect("run ok");

    let seen = drain_events(&mut rx);
    assert_eq!(
        count_events(&seen, |e| matches!(e, Event::SutStarting { .. })),
        1
    );
    assert_eq!(
        count_events(&seen, |e| matches!(e, Event::SutStopping { .. })),
        1
    );
    assert_eq!(
        count_events(&seen, |e| matches!(
            e,
            Event::CommandStarted { .. } | Event::SuiteStarted { .. } | Event::SessionError { .. }
        )),
        0
    );
    assert!(
        !session.workdir().results_path().exists(),
        "no suite work, no results file"
    );
    assert!(sut.executed().is_empty());
}

#[tokio::test]
async fn unknown_suite_fails_with_resolution_error() {
    let events = EventBus::new();
    let mut rx = events.subscribe();
    let session = build_session(
        Arc::new(FakeSut::new()),
        FakeFramework::new(),
        events,
        Duration::from_secs(5),
    );

    let err = session
        .run(RunOptions {
            suites: vec!["nonexistent".into()],
            ..RunOptions::default()
        })
        .await
        .expect_err("resolution must fail");

    assert!(matches!(err, AppError::Resolution(_)));
    assert!(err.to_string().contains("nonexistent"));
    assert!(!session.workdir().results_path().exists());

    let seen = drain_events(&mut rx);
    assert_eq!(
        count_events(&seen, |e| matches!(e, Event::SessionError { .. })),
        1
    );
}

#[tokio::test]
async fn failed_resolution_surfaces_framework_error() {
    let framework = FakeFramework::new()
        .with_suite(suite_of("good", &["true"]))
        .with_failing("bad");
    let session = build_session(
        Arc::new(FakeSut::new()),
        framework,
        EventBus::new(),
        Duration::from_secs(5),
    );

    let err = session
        .run(RunOptions {
            suites: vec!["good".into(), "bad".into()],
            ..RunOptions::default()
        })
        .await
        .expect_err("resolution must fail");
    assert!(matches!(err, AppError::Resolution(_)));
}

#[tokio::test(start_paused = true)]
async fn command_exceeding_deadline_yields_timeout_error() {
    let events = EventBus::new();
    let mut rx = events.subscribe();
    let sut = Arc::new(FakeSut::new().with_behavior("stress --loop", Behavior::Hang));
    let session = build_session(
        Arc::clone(&sut),
        FakeFramework::new(),
        events,
        Duration::from_millis(100),
    );

    let err = session
        .run(RunOptions {
            command: Some("stress --loop".into()),
            ..RunOptions::default()
        })
        .await
        .expect_err("command must time out");

    match err {
        AppError::CommandTimeout(ref command) => assert_eq!(command, "stress --loop"),
        other => panic!("expected timeout, got {other}"),
    }

    let seen = drain_events(&mut rx);
    assert_eq!(
        count_events(&seen, |e| matches!(e, Event::CommandStarted { .. })),
        1
    );
}

#[tokio::test]
async fn results_are_exported_with_identical_report_copy() {
    let framework = FakeFramework::new().with_suite(suite_of("smoke", &["true", "true"]));
    let events = EventBus::new();
    let mut rx = events.subscribe();
    let session = build_session(
        Arc::new(FakeSut::new()),
        framework,
        events,
        Duration::from_secs(5),
    );

    let report_dir = tempfile::tempdir().expect("tempdir");
    let report_path = report_dir.path().join("report.json");

    session
        .run(RunOptions {
            suites: vec!["smoke".into()],
            report_path: Some(report_path.clone()),
            ..RunOptions::default()
        })
        .await
        .expect("run ok");

    let default_raw =
        std::fs::read(session.workdir().results_path()).expect("results.json exists");
    let report_raw = std::fs::read(&report_path).expect("report copy exists");
    assert_eq!(default_raw, report_raw, "both exports are byte-identical");

    let exported: SessionResults =
        serde_json::from_slice(&default_raw).expect("valid results json");
    assert_eq!(exported, session.scheduler().results());
    assert_eq!(exported.total_tests(), 2);

    let seen = drain_events(&mut rx);
    assert_eq!(
        count_events(&seen, |e| matches!(e, Event::SessionCompleted { .. })),
        1
    );
}

#[tokio::test]
async fn sequential_runs_fully_serialize() {
    let framework = FakeFramework::new().with_suite(suite_of("smoke", &["true"]));
    let events = EventBus::new();
    let mut rx = events.subscribe();
    let session = Arc::new(build_session(
        Arc::new(FakeSut::new()),
        framework,
        events,
        Duration::from_secs(5),
    ));

    let first = Arc::clone(&session);
    let second = Arc::clone(&session);
    let opts = RunOptions {
        suites: vec!["smoke".into()],
        ..RunOptions::default()
    };
    let opts2 = opts.clone();

    let (r1, r2) = tokio::join!(
        tokio::spawn(async move { first.run(opts).await }),
        tokio::spawn(async move { second.run(opts2).await }),
    );
    r1.expect("join").expect("first run ok");
    r2.expect("join").expect("second run ok");

    let seen = drain_events(&mut rx);
    let started: Vec<usize> = seen
        .iter()
        .enumerate()
        .filter(|(_, e)| matches!(e, Event::SessionStarted { .. }))
        .map(|(i, _)| i)
        .collect();
    let completed: Vec<usize> = seen
        .iter()
        .enumerate()
        .filter(|(_, e)| matches!(e, Event::SessionCompleted { .. }))
        .map(|(i, _)| i)
        .collect();

    assert_eq!(started.len(), 2);
    assert_eq!(completed.len(), 2);
    assert!(
        completed[0] < started[1],
        "second run must not start before the first's terminal event"
    );
}

#[tokio::test]
async fn non_parallel_sut_downgrades_to_one_worker() {
    let sut = Arc::new(FakeSut::new().with_parallel(false));
    let session = Session::builder()
        .workdir(RunDir::temporary().expect("tempdir"))
        .framework(Arc::new(FakeFramework::new()))
        .sut(sut)
        .workers(8)
        .build()
        .expect("session builds");

    assert_eq!(session.scheduler().workers(), 1);
}

#[tokio::test]
async fn communicate_failure_propagates_as_error() {
    let events = EventBus::new();
    let mut rx = events.subscribe();
    let session = build_session(
        Arc::new(FakeSut::new().failing_communicate()),
        FakeFramework::new(),
        events,
        Duration::from_secs(5),
    );

    let err = session
        .run(RunOptions::default())
        .await
        .expect_err("communicate failure must propagate");
    assert!(matches!(err, AppError::Sut(_)));

    let seen = drain_events(&mut rx);
    assert_eq!(
        count_events(&seen, |e| matches!(e, Event::SessionError { .. })),
        1
    );
}
