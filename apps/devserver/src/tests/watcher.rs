use crate::watcher::{FileChange, WatchKind, WatchRoots, should_ignore, spawn_change_router};

use devserver_core::config::WatchConfig;
use devserver_core::hub::CompilerEvent;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::{TempDir, tempdir};
use tokio::sync::mpsc;

fn patterns() -> Vec<String> {
    vec!["node_modules".to_string(), "*.swp".to_string()]
}

/// Test helper: project with `src/`, `public/` and `public/src/`.
fn project() -> (TempDir, PathBuf) {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();
    fs::create_dir_all(dir.path().join("public/src")).unwrap();
    let root = dir.path().canonicalize().unwrap();
    (dir, root)
}

fn watch_config(source: &[&str], statics: &[&str]) -> WatchConfig {
    WatchConfig {
        source_dirs: source.iter().map(PathBuf::from).collect(),
        static_dirs: statics.iter().map(PathBuf::from).collect(),
        ..WatchConfig::default()
    }
}

#[test]
fn given_ignored_component_when_checked_then_path_is_ignored() {
    let root = Path::new("/project/src");

    assert!(should_ignore(
        Path::new("/project/src/node_modules/pkg/index.js"),
        root,
        &patterns()
    ));
    assert!(!should_ignore(
        Path::new("/project/src/components/index.js"),
        root,
        &patterns()
    ));
}

/// **BUG THIS CATCHES**: Would catch substring matching, where a pattern
/// like `node_modules` also swallows `my_node_modules_helper.js`.
#[test]
fn given_pattern_inside_file_name_when_checked_then_path_is_kept() {
    let root = Path::new("/project/src");

    let ignored = should_ignore(
        Path::new("/project/src/my_node_modules_helper.js"),
        root,
        &patterns(),
    );

    assert!(!ignored);
}

#[test]
fn given_suffix_pattern_or_hidden_file_when_checked_then_path_is_ignored() {
    let root = Path::new("/project/src");

    assert!(should_ignore(Path::new("/project/src/.main.rs.swp"), root, &patterns()));
    assert!(should_ignore(Path::new("/project/src/app.js.swp"), root, &patterns()));
    assert!(should_ignore(Path::new("/project/src/.cache/x.js"), root, &patterns()));
    assert!(should_ignore(Path::new("/elsewhere/app.js"), root, &patterns()));
}

#[test]
fn given_missing_dirs_when_roots_resolved_then_only_existing_are_watched() {
    let (_dir, root) = project();

    let roots = WatchRoots::new(&root, &watch_config(&["src", "lib"], &["assets"]));

    let expected = root.join("src");
    let dirs: Vec<&Path> = roots.dirs().collect();
    assert_eq!(dirs, vec![expected.as_path()]);
    assert!(!roots.is_empty());
}

#[test]
fn given_no_existing_dirs_when_roots_resolved_then_roots_are_empty() {
    let (_dir, root) = project();

    let roots = WatchRoots::new(&root, &watch_config(&["lib"], &["assets"]));

    assert!(roots.is_empty());
}

/// **VALUE**: A change is classified by the directory it lives in.
///
/// **WHY THIS MATTERS**: Source edits must rebuild, while static edits only
/// reload; swapping them either wastes a build or misses one.
///
/// **BUG THIS CATCHES**: Would catch nested roots resolving to the outer
/// directory, so `public/src/x.css` would trigger a rebuild.
#[test]
fn given_nested_roots_when_classified_then_deepest_root_wins() {
    // GIVEN: `src` as source, `public` as static (which contains its own `src`)
    let (_dir, root) = project();
    let roots = WatchRoots::new(&root, &watch_config(&["src"], &["public"]));

    // WHEN: Classifying paths in each
    let source = roots.classify(&root.join("src/main.js"));
    let nested = roots.classify(&root.join("public/src/x.css"));
    let outside = roots.classify(&root.join("README.md"));

    // THEN: Kind follows the containing root, paths are project-relative
    assert_eq!(
        source,
        Some(FileChange {
            kind: WatchKind::Source,
            path: PathBuf::from("src/main.js"),
        })
    );
    assert_eq!(
        nested,
        Some(FileChange {
            kind: WatchKind::Static,
            path: PathBuf::from("public/src/x.css"),
        })
    );
    assert_eq!(outside, None);
}

#[test]
fn given_ignored_file_in_root_when_classified_then_none() {
    let (_dir, root) = project();
    let roots = WatchRoots::new(&root, &watch_config(&["src"], &["public"]));

    assert_eq!(roots.classify(&root.join("src/node_modules/a.js")), None);
    assert_eq!(roots.classify(&root.join("public/.DS_Store")), None);
}

#[tokio::test]
async fn given_static_change_when_routed_then_hub_event_has_relative_path() {
    let (changes_tx, changes_rx) = mpsc::channel(8);
    let (rebuild_tx, mut rebuild_rx) = mpsc::channel(1);
    let (events_tx, mut events_rx) = mpsc::channel(8);
    let router = spawn_change_router(changes_rx, rebuild_tx, events_tx);

    changes_tx
        .send(FileChange {
            kind: WatchKind::Static,
            path: PathBuf::from("public").join("logo.svg"),
        })
        .await
        .unwrap();
    drop(changes_tx);
    router.await.unwrap();

    assert_eq!(
        events_rx.recv().await,
        Some(CompilerEvent::StaticChanged("public/logo.svg".to_string()))
    );
    assert!(rebuild_rx.try_recv().is_err());
}

/// **VALUE**: A burst of source saves queues a single pending rebuild.
///
/// **BUG THIS CATCHES**: Would catch the router blocking on a full trigger
/// channel, which stalls static notifications behind a slow build.
#[tokio::test]
async fn given_burst_of_source_changes_when_routed_then_one_rebuild_is_pending() {
    // GIVEN: A router with a one-slot trigger channel nobody is draining
    let (changes_tx, changes_rx) = mpsc::channel(8);
    let (rebuild_tx, mut rebuild_rx) = mpsc::channel(1);
    let (events_tx, mut events_rx) = mpsc::channel(8);
    let router = spawn_change_router(changes_rx, rebuild_tx, events_tx);

    // WHEN: Five source changes then a static change arrive
    for i in 0..5 {
        changes_tx
            .send(FileChange {
                kind: WatchKind::Source,
                path: PathBuf::from(format!("src/{i}.js")),
            })
            .await
            .unwrap();
    }
    changes_tx
        .send(FileChange {
            kind: WatchKind::Static,
            path: PathBuf::from("public/index.html"),
        })
        .await
        .unwrap();
    drop(changes_tx);
    tokio::time::timeout(Duration::from_secs(5), router)
        .await
        .expect("router should not block")
        .unwrap();

    // THEN: Exactly one trigger, and the static change still got through
    assert_eq!(rebuild_rx.try_recv(), Ok(()));
    assert!(rebuild_rx.try_recv().is_err());
    assert_eq!(
        events_rx.recv().await,
        Some(CompilerEvent::StaticChanged("public/index.html".to_string()))
    );
}
