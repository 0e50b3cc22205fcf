use crate::build_runner::{BuildRunner, HASH_LEN, hash_output_dir, parse_diagnostics};

use devserver_core::config::BuildConfig;
use models::BuildMessage;

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use tempfile::tempdir;
use tokio::sync::mpsc;

#[test]
fn given_error_and_warning_lines_when_parsed_then_both_are_collected_in_order() {
    let output = "\
Compiling app
warning: unused variable `x`
error: mismatched types
error: cannot find value `y`
done";

    let diagnostics = parse_diagnostics(output);

    assert_eq!(
        diagnostics.warnings,
        vec![BuildMessage::new("unused variable `x`")]
    );
    assert_eq!(
        diagnostics.errors,
        vec![
            BuildMessage::new("mismatched types"),
            BuildMessage::new("cannot find value `y`"),
        ]
    );
}

/// **VALUE**: Diagnostics pick up the file they point at.
///
/// **WHY THIS MATTERS**: The overlay shows the file next to each message, so
/// the developer can jump to it.
///
/// **BUG THIS CATCHES**: Would catch the `-->` line being attached to the
/// wrong diagnostic, or overriding a file already named in the message.
#[test]
fn given_location_lines_when_parsed_then_files_are_attached() {
    // GIVEN: rustc-style output and an inline file reference
    let output = "\
error[E0308]: mismatched types
  --> src/main.rs:4:18
warning: styles/app.css:12: unknown property
  --> ignored/other.css:1:1";

    // WHEN: Parsing
    let diagnostics = parse_diagnostics(output);

    // THEN: Each diagnostic carries its own file
    assert_eq!(
        diagnostics.errors,
        vec![BuildMessage::new("mismatched types").with_file("src/main.rs")]
    );
    assert_eq!(
        diagnostics.warnings,
        vec![BuildMessage::new("styles/app.css:12: unknown property").with_file("styles/app.css")]
    );
}

#[test]
fn given_summary_lines_when_parsed_then_they_are_not_diagnostics() {
    let output = "\
warning: `app` (bin \"app\") generated 2 warnings
error: could not compile `app` due to 1 previous error
Error: build failed";

    let diagnostics = parse_diagnostics(output);

    assert!(diagnostics.errors.is_empty());
    assert!(diagnostics.warnings.is_empty());
}

#[test]
fn given_mixed_case_levels_when_parsed_then_levels_are_recognized() {
    let diagnostics = parse_diagnostics("ERROR: disk full\n  Warning : slow path");

    assert_eq!(diagnostics.errors, vec![BuildMessage::new("disk full")]);
    assert_eq!(diagnostics.warnings, vec![BuildMessage::new("slow path")]);
}

#[test]
fn given_missing_output_dir_when_hashed_then_hash_is_empty() {
    let dir = tempdir().unwrap();

    let hash = hash_output_dir(&dir.path().join("dist")).unwrap();

    assert_eq!(hash, "");
}

/// **VALUE**: The build hash changes exactly when the output changes.
///
/// **WHY THIS MATTERS**: The hub suppresses a `done` whose hash matches the
/// last one; a hash that drifts without changes causes spurious reloads, and
/// one that misses changes hides real ones.
///
/// **BUG THIS CATCHES**: Would catch hashing in directory-listing order, or
/// ignoring file names so a rename goes unnoticed.
#[test]
fn given_output_dir_when_contents_change_then_hash_changes() {
    // GIVEN: An output directory with two files
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join("assets")).unwrap();
    fs::write(dir.path().join("index.js"), "console.log(1)").unwrap();
    fs::write(dir.path().join("assets/app.css"), "body {}").unwrap();

    // WHEN: Hashing before and after edits
    let first = hash_output_dir(dir.path()).unwrap();
    let again = hash_output_dir(dir.path()).unwrap();
    fs::write(dir.path().join("index.js"), "console.log(2)").unwrap();
    let edited = hash_output_dir(dir.path()).unwrap();
    fs::rename(dir.path().join("index.js"), dir.path().join("main.js")).unwrap();
    let renamed = hash_output_dir(dir.path()).unwrap();

    // THEN: Stable for equal contents, different otherwise
    assert_eq!(first.len(), HASH_LEN);
    assert_eq!(first, again);
    assert_ne!(first, edited);
    assert_ne!(edited, renamed);
}

#[tokio::test]
async fn given_no_build_command_when_built_then_state_is_clean_with_output_hash() {
    let project = tempdir().unwrap();
    fs::create_dir_all(project.path().join("dist")).unwrap();
    fs::write(project.path().join("dist/index.html"), "<html></html>").unwrap();
    let (events, _rx) = mpsc::channel(8);
    let runner = BuildRunner::new(
        project.path(),
        &BuildConfig::default(),
        Duration::ZERO,
        events,
    );

    let state = runner.build().await;

    assert!(state.is_clean());
    assert_eq!(
        state.hash(),
        hash_output_dir(&project.path().join("dist")).unwrap()
    );
}

#[tokio::test]
async fn given_missing_program_when_built_then_spawn_failure_is_an_error() {
    let project = tempdir().unwrap();
    let config = BuildConfig {
        command: vec!["definitely-not-a-real-build-tool-3f9a".to_string()],
        output_dir: PathBuf::from("dist"),
    };
    let (events, _rx) = mpsc::channel(8);
    let runner = BuildRunner::new(project.path(), &config, Duration::ZERO, events);

    let state = runner.build().await;

    assert!(state.has_errors());
    assert!(state.errors()[0].message.contains("definitely-not-a-real-build-tool-3f9a"));
}
