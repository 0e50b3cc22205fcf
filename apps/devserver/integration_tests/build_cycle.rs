use crate::helpers::{next_event, test_project, write};

use devserver::build_runner::{BuildRunner, hash_output_dir};

use devserver_core::config::BuildConfig;
use devserver_core::hub::CompilerEvent;

use models::{BuildMessage, BuildState};

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;

const DEBOUNCE: Duration = Duration::from_millis(50);

fn shell(script: &str) -> BuildConfig {
    BuildConfig {
        command: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
        output_dir: PathBuf::from("dist"),
    }
}

/// Test helper: Expect an `Invalid` then return the following `Done` state.
async fn next_build(events: &mut mpsc::Receiver<CompilerEvent>) -> BuildState {
    assert_eq!(next_event(events).await, CompilerEvent::Invalid);
    match next_event(events).await {
        CompilerEvent::Done(state) => state,
        other => panic!("Expected Done, got {other:?}"),
    }
}

/// **VALUE**: Diagnostics from both output streams reach the build state.
///
/// **WHY THIS MATTERS**: Compilers print errors on stderr and progress on
/// stdout; reading only one hides half of the problems from the overlay.
///
/// **BUG THIS CATCHES**: Would catch stderr being discarded, or a failing
/// exit status adding a second generic error on top of the real one.
#[cfg(unix)]
#[tokio::test]
async fn given_failing_build_when_run_then_errors_and_warnings_are_reported() {
    // GIVEN: A build printing a warning on stdout and an error on stderr
    let project = test_project();
    let config = shell("echo 'warning: unused import'; echo 'error: oops' >&2; exit 1");
    let (events_tx, mut events) = mpsc::channel(8);
    let runner = BuildRunner::new(project.path(), &config, DEBOUNCE, events_tx);

    // WHEN: Running one build
    assert!(runner.run_once().await);

    // THEN: Invalid, then Done with both diagnostics
    let state = next_build(&mut events).await;
    assert_eq!(state.warnings(), [BuildMessage::new("unused import")]);
    assert_eq!(state.errors(), [BuildMessage::new("oops")]);
    assert_eq!(
        state.hash(),
        hash_output_dir(&project.path().join("dist")).unwrap()
    );
}

#[cfg(unix)]
#[tokio::test]
async fn given_silent_failure_when_run_then_exit_status_becomes_an_error() {
    let project = test_project();
    let (events_tx, mut events) = mpsc::channel(8);
    let runner = BuildRunner::new(project.path(), &shell("exit 3"), DEBOUNCE, events_tx);

    runner.run_once().await;

    let state = next_build(&mut events).await;
    assert_eq!(state.errors().len(), 1);
    assert!(state.errors()[0].message.contains("exited with"));
}

#[cfg(unix)]
#[tokio::test]
async fn given_build_writes_output_when_run_then_hash_covers_new_output() {
    let project = test_project();
    let before = hash_output_dir(&project.path().join("dist")).unwrap();
    let (events_tx, mut events) = mpsc::channel(8);
    let runner = BuildRunner::new(
        project.path(),
        &shell("echo 'v2' > dist/bundle.js"),
        DEBOUNCE,
        events_tx,
    );

    runner.run_once().await;

    let state = next_build(&mut events).await;
    assert!(state.is_clean());
    assert_ne!(state.hash(), before);
}

/// **VALUE**: The runner builds on start and again per trigger.
///
/// **BUG THIS CATCHES**: Would catch the initial build being skipped, so the
/// hub has no status for clients until the first edit.
#[tokio::test]
async fn given_spawned_runner_when_triggered_then_rebuilds_with_new_hash() {
    // GIVEN: A spawned runner without a build command
    let project = test_project();
    let (events_tx, mut events) = mpsc::channel(8);
    let (trigger_tx, trigger_rx) = mpsc::channel(4);
    let task = BuildRunner::new(project.path(), &BuildConfig::default(), DEBOUNCE, events_tx)
        .spawn(trigger_rx);
    let first = next_build(&mut events).await;

    // WHEN: The output changes and a rebuild is triggered
    write(project.path(), "dist/index.html", "<script>v2</script>");
    trigger_tx.send(()).await.unwrap();

    // THEN: A second build with a different hash
    let second = next_build(&mut events).await;
    assert_ne!(first.hash(), second.hash());

    drop(trigger_tx);
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("runner should stop once triggers are gone")
        .unwrap();
}

#[tokio::test]
async fn given_burst_of_triggers_when_debounced_then_single_rebuild() {
    let project = test_project();
    let (events_tx, mut events) = mpsc::channel(8);
    let (trigger_tx, trigger_rx) = mpsc::channel(4);
    let _task = BuildRunner::new(project.path(), &BuildConfig::default(), DEBOUNCE, events_tx)
        .spawn(trigger_rx);
    next_build(&mut events).await;

    for _ in 0..3 {
        trigger_tx.send(()).await.unwrap();
    }

    next_build(&mut events).await;
    let extra = tokio::time::timeout(DEBOUNCE * 6, events.recv()).await;
    assert!(extra.is_err(), "expected no further builds, got {extra:?}");
}

#[tokio::test]
async fn given_event_loop_gone_when_build_runs_then_runner_reports_it() {
    let project = test_project();
    let (events_tx, events) = mpsc::channel(8);
    drop(events);
    let runner = BuildRunner::new(project.path(), &BuildConfig::default(), DEBOUNCE, events_tx);

    assert!(!runner.run_once().await);
}
