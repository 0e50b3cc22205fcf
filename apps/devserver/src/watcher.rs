//! File system watcher for the project's source and static directories.
//!
//! Source changes become rebuild triggers for the [`BuildRunner`]; static
//! changes go straight to the hub as [`CompilerEvent::StaticChanged`].
//!
//! [`BuildRunner`]: crate::build_runner::BuildRunner

use crate::error::DevServerError;

use common::ErrorLocation;
use devserver_core::config::WatchConfig;
use devserver_core::hub::CompilerEvent;

use std::panic::Location;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::spawn as TokioSpawn;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

const CHANGE_BUFFER: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchKind {
    /// Needs a rebuild.
    Source,
    /// Served as is; the browser only needs to reload.
    Static,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub kind: WatchKind,
    /// Relative to the project root.
    pub path: PathBuf,
}

impl FileChange {
    /// Project-relative path with `/` separators, as sent to clients.
    pub fn display_path(&self) -> String {
        self.path.to_string_lossy().replace('\\', "/")
    }
}

/// The project's watched directories, each tagged with what a change means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchRoots {
    project_dir: PathBuf,
    roots: Vec<(PathBuf, WatchKind)>,
    ignore: Vec<String>,
}

impl WatchRoots {
    /// Resolve `config` against `project_dir`, keeping only directories
    /// that exist.
    pub fn new(project_dir: &Path, config: &WatchConfig) -> Self {
        let project_dir = project_dir
            .canonicalize()
            .unwrap_or_else(|_| project_dir.to_path_buf());

        let tagged = config
            .source_dirs
            .iter()
            .map(|dir| (dir, WatchKind::Source))
            .chain(config.static_dirs.iter().map(|dir| (dir, WatchKind::Static)));

        let mut roots = Vec::new();
        for (dir, kind) in tagged {
            let dir = project_dir.join(dir);
            match dir.canonicalize() {
                Ok(dir) if dir.is_dir() => roots.push((dir, kind)),
                _ => warn!("Not watching {}: no such directory", dir.display()),
            }
        }

        Self {
            project_dir,
            roots,
            ignore: config.ignore.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn dirs(&self) -> impl Iterator<Item = &Path> {
        self.roots.iter().map(|(dir, _)| dir.as_path())
    }

    /// What a change at `path` means, or `None` if it is ignored or outside
    /// every watched directory. Nested roots resolve to the deepest one.
    pub fn classify(&self, path: &Path) -> Option<FileChange> {
        let (root, kind) = self
            .roots
            .iter()
            .filter(|(root, _)| path.starts_with(root))
            .max_by_key(|(root, _)| root.components().count())?;

        if should_ignore(path, root, &self.ignore) {
            return None;
        }

        let relative = path.strip_prefix(&self.project_dir).ok()?;
        Some(FileChange {
            kind: *kind,
            path: relative.to_path_buf(),
        })
    }
}

/// Whether `path` (inside `root`) is excluded from watching.
///
/// `patterns` match whole path components (`node_modules`) or, when they
/// start with `*`, file suffixes (`*.swp`). Hidden files and directories are
/// always ignored.
pub(crate) fn should_ignore(path: &Path, root: &Path, patterns: &[String]) -> bool {
    let Ok(relative) = path.strip_prefix(root) else {
        return true;
    };
    let path_str = relative.to_string_lossy();

    for pattern in patterns {
        if let Some(suffix) = pattern.strip_prefix('*') {
            if path_str.ends_with(suffix) {
                return true;
            }
        } else if relative
            .components()
            .any(|component| component.as_os_str() == pattern.as_str())
        {
            return true;
        }
    }

    relative.components().any(|component| match component {
        Component::Normal(name) => name.to_string_lossy().starts_with('.'),
        _ => false,
    })
}

/// Recursive watcher over every [`WatchRoots`] directory.
///
/// Stops watching when dropped.
pub struct ProjectWatcher {
    _watcher: RecommendedWatcher,
    roots: WatchRoots,
}

impl ProjectWatcher {
    /// Start watching.
    ///
    /// Repeated events for the same path within `debounce` are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`DevServerError::Watch`] if the platform watcher cannot be
    /// created or a directory cannot be watched.
    #[track_caller]
    pub fn new(
        roots: WatchRoots,
        debounce: Duration,
    ) -> Result<(Self, mpsc::Receiver<FileChange>), DevServerError> {
        let location = ErrorLocation::from(Location::caller());
        let (tx, rx) = mpsc::channel(CHANGE_BUFFER);

        let filter = roots.clone();
        let mut last_event: Option<(PathBuf, Instant)> = None;

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    warn!("File watcher error: {e}");
                    return;
                }
            };
            if !matches!(
                event.kind,
                EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
            ) {
                return;
            }

            for path in &event.paths {
                let Some(change) = filter.classify(path) else {
                    continue;
                };

                let now = Instant::now();
                if let Some((last_path, last_time)) = &last_event
                    && last_path == path
                    && now.duration_since(*last_time) < debounce
                {
                    continue;
                }
                last_event = Some((path.clone(), now));

                // Runs on notify's own thread, outside the runtime.
                if tx.blocking_send(change).is_err() {
                    return;
                }
            }
        })
        .map_err(|e| DevServerError::Watch {
            message: format!("Failed to create file watcher: {e}"),
            location,
        })?;

        for dir in roots.dirs() {
            watcher
                .watch(dir, RecursiveMode::Recursive)
                .map_err(|e| DevServerError::Watch {
                    message: format!("Failed to watch {}: {e}", dir.display()),
                    location,
                })?;
            info!("Watching {}", dir.display());
        }

        Ok((
            Self {
                _watcher: watcher,
                roots,
            },
            rx,
        ))
    }

    pub fn roots(&self) -> &WatchRoots {
        &self.roots
    }
}

/// Route file changes: source edits request a rebuild, static edits are
/// announced to the hub.
///
/// The rebuild channel is expected to be small; a trigger that finds it full
/// is dropped because a rebuild is already pending.
pub fn spawn_change_router(
    mut changes: mpsc::Receiver<FileChange>,
    rebuild: mpsc::Sender<()>,
    events: mpsc::Sender<CompilerEvent>,
) -> JoinHandle<()> {
    TokioSpawn(async move {
        while let Some(change) = changes.recv().await {
            debug!("{:?} change: {}", change.kind, change.display_path());

            match change.kind {
                WatchKind::Source => match rebuild.try_send(()) {
                    Ok(()) | Err(TrySendError::Full(())) => {}
                    Err(TrySendError::Closed(())) => break,
                },
                WatchKind::Static => {
                    let event = CompilerEvent::StaticChanged(change.display_path());
                    if events.send(event).await.is_err() {
                        break;
                    }
                }
            }
        }

        debug!("Change router stopped");
    })
}
