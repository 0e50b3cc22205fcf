//! Runs the configured build command and reports it to the hub.
//!
//! Every build is announced as [`CompilerEvent::Invalid`] followed by a
//! [`CompilerEvent::Done`] carrying the output hash and the diagnostics
//! scraped from the command's output.

use crate::error::DevServerError;

use common::ErrorLocation;
use devserver_core::config::BuildConfig;
use devserver_core::hub::CompilerEvent;
use models::{BuildMessage, BuildState, BuildStateBuilder};

use std::fs::File;
use std::io::{BufReader, Read};
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};
use regex::Regex;
use tokio::process::Command as TokioCommand;
use tokio::spawn as TokioSpawn;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use walkdir::WalkDir;

/// Hex characters of the blake3 digest kept in the build hash.
pub const HASH_LEN: usize = 20;

const DIAGNOSTIC_PATTERN: &str =
    r"(?i)^\s*(?P<level>error|warning)(?:\[[^\]]*\])?\s*:\s*(?P<message>.+)$";
const LOCATION_PATTERN: &str = r"^\s*-->\s*(?P<file>\S+?):\d+(?::\d+)?\s*$";
const FILE_PATTERN: &str = r"(?P<file>[\w./\\-]+\.[A-Za-z0-9]+):\d+(?::\d+)?";
const SUMMARY_PATTERN: &str =
    r"(?i)(generated \d+ warnings?|could not compile|aborting due to|build failed)";

const CAPTURE_LEVEL: &str = "level";
const CAPTURE_MESSAGE: &str = "message";
const CAPTURE_FILE: &str = "file";

static DIAGNOSTIC_REGEX: OnceLock<Regex> = OnceLock::new();
static LOCATION_REGEX: OnceLock<Regex> = OnceLock::new();
static FILE_REGEX: OnceLock<Regex> = OnceLock::new();
static SUMMARY_REGEX: OnceLock<Regex> = OnceLock::new();

fn diagnostic_regex() -> &'static Regex {
    DIAGNOSTIC_REGEX.get_or_init(|| Regex::new(DIAGNOSTIC_PATTERN).expect("valid regex pattern"))
}

fn location_regex() -> &'static Regex {
    LOCATION_REGEX.get_or_init(|| Regex::new(LOCATION_PATTERN).expect("valid regex pattern"))
}

fn file_regex() -> &'static Regex {
    FILE_REGEX.get_or_init(|| Regex::new(FILE_PATTERN).expect("valid regex pattern"))
}

fn summary_regex() -> &'static Regex {
    SUMMARY_REGEX.get_or_init(|| Regex::new(SUMMARY_PATTERN).expect("valid regex pattern"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Severity {
    Error,
    Warning,
}

/// Errors and warnings scraped from build output, in output order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    pub errors: Vec<BuildMessage>,
    pub warnings: Vec<BuildMessage>,
}

impl Diagnostics {
    fn push(&mut self, severity: Severity, message: BuildMessage) {
        match severity {
            Severity::Error => self.errors.push(message),
            Severity::Warning => self.warnings.push(message),
        }
    }

    fn last_mut(&mut self, severity: Severity) -> Option<&mut BuildMessage> {
        match severity {
            Severity::Error => self.errors.last_mut(),
            Severity::Warning => self.warnings.last_mut(),
        }
    }
}

/// Collect `error: ...` / `warning: ...` lines from compiler output.
///
/// A `--> file:line:col` line following a diagnostic names its file, as does
/// a `file.ext:line` reference inside the message itself. Summary lines such
/// as "generated 3 warnings" are not diagnostics.
pub fn parse_diagnostics(output: &str) -> Diagnostics {
    let mut diagnostics = Diagnostics::default();
    let mut last: Option<Severity> = None;

    for line in output.lines() {
        trace!("[build] {line}");

        if let Some(captures) = location_regex().captures(line) {
            if let Some(severity) = last
                && let Some(message) = diagnostics.last_mut(severity)
                && message.file.is_none()
            {
                message.file = Some(captures[CAPTURE_FILE].to_string());
            }
            continue;
        }

        let Some(captures) = diagnostic_regex().captures(line) else {
            continue;
        };
        let text = captures[CAPTURE_MESSAGE].trim();
        if summary_regex().is_match(text) {
            last = None;
            continue;
        }

        let severity = if captures[CAPTURE_LEVEL].eq_ignore_ascii_case("error") {
            Severity::Error
        } else {
            Severity::Warning
        };

        let mut message = BuildMessage::new(text);
        if let Some(file) = file_regex().captures(text) {
            message = message.with_file(&file[CAPTURE_FILE]);
        }
        diagnostics.push(severity, message);
        last = Some(severity);
    }

    diagnostics
}

/// Hash every file under `dir`: relative path and contents, in path order.
///
/// A missing directory hashes to the empty string.
///
/// # Errors
///
/// Returns [`DevServerError::Build`] if the tree cannot be walked or a file
/// cannot be read.
#[track_caller]
pub fn hash_output_dir(dir: &Path) -> Result<String, DevServerError> {
    let location = ErrorLocation::from(Location::caller());

    if !dir.is_dir() {
        debug!("Output directory {} does not exist", dir.display());
        return Ok(String::new());
    }

    let mut hasher = blake3::Hasher::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| DevServerError::Build {
            message: format!("Failed to walk {}: {e}", dir.display()),
            location,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        hasher.update(relative.to_string_lossy().replace('\\', "/").as_bytes());
        hasher.update(&[0]);

        let file = File::open(entry.path()).map_err(|e| DevServerError::Build {
            message: format!("Failed to open {}: {e}", entry.path().display()),
            location,
        })?;
        let mut reader = BufReader::new(file);
        let mut buffer = [0u8; 8192];
        loop {
            let read = reader.read(&mut buffer).map_err(|e| DevServerError::Build {
                message: format!("Failed to read {}: {e}", entry.path().display()),
                location,
            })?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }
    }

    let mut hash = hasher.finalize().to_hex().to_string();
    hash.truncate(HASH_LEN);
    Ok(hash)
}

pub struct BuildRunner {
    project_dir: PathBuf,
    command: Vec<String>,
    output_dir: PathBuf,
    debounce: Duration,
    events: mpsc::Sender<CompilerEvent>,
}

impl BuildRunner {
    /// Relative paths in `config` are taken from `project_dir`.
    pub fn new(
        project_dir: &Path,
        config: &BuildConfig,
        debounce: Duration,
        events: mpsc::Sender<CompilerEvent>,
    ) -> Self {
        Self {
            project_dir: project_dir.to_path_buf(),
            command: config.command.clone(),
            output_dir: project_dir.join(&config.output_dir),
            debounce,
            events,
        }
    }

    /// Build once now, then again after every burst of triggers.
    ///
    /// Triggers arriving while a build runs, or within `debounce` of the
    /// first one, collapse into a single rebuild. The task ends when every
    /// trigger sender is dropped or the hub's event loop is gone.
    pub fn spawn(self, mut triggers: mpsc::Receiver<()>) -> JoinHandle<()> {
        TokioSpawn(async move {
            if !self.run_once().await {
                return;
            }

            while triggers.recv().await.is_some() {
                tokio::time::sleep(self.debounce).await;
                while triggers.try_recv().is_ok() {}

                if !self.run_once().await {
                    break;
                }
            }

            debug!("Build runner stopped");
        })
    }

    /// Announce, run and report one build.
    ///
    /// Returns `false` once nobody is listening for compiler events.
    pub async fn run_once(&self) -> bool {
        if self.events.send(CompilerEvent::Invalid).await.is_err() {
            return false;
        }

        let state = self.build().await;
        self.events.send(CompilerEvent::Done(state)).await.is_ok()
    }

    /// Run the build command (if any) and snapshot its result.
    pub async fn build(&self) -> BuildState {
        let started = Instant::now();
        let diagnostics = match self.run_command().await {
            Ok(diagnostics) => diagnostics,
            Err(e) => {
                warn!("{e}");
                Diagnostics {
                    errors: vec![BuildMessage::new(e.to_string())],
                    warnings: Vec::new(),
                }
            }
        };

        let mut builder = BuildStateBuilder::default()
            .with_errors(diagnostics.errors)
            .with_warnings(diagnostics.warnings);
        match hash_output_dir(&self.output_dir) {
            Ok(hash) => builder = builder.with_hash(hash),
            Err(e) => {
                warn!("{e}");
                builder = builder.with_error(e.to_string());
            }
        }

        let state = match builder.build() {
            Ok(state) => state,
            Err(e) => {
                warn!("Discarding malformed build result: {e}");
                BuildState::new(String::new(), vec![BuildMessage::new(e.to_string())], Vec::new())
            }
        };

        info!(
            "Build {} finished in {:?}: {} error(s), {} warning(s)",
            state.hash(),
            started.elapsed(),
            state.errors().len(),
            state.warnings().len()
        );
        state
    }

    async fn run_command(&self) -> Result<Diagnostics, DevServerError> {
        let Some((program, args)) = self.command.split_first() else {
            return Ok(Diagnostics::default());
        };

        debug!("Running build command: {}", self.command.join(" "));
        let output = TokioCommand::new(program)
            .args(args)
            .current_dir(&self.project_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| DevServerError::Build {
                message: format!("Failed to run build command '{program}': {e}"),
                location: ErrorLocation::from(Location::caller()),
            })?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push('\n');
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        let mut diagnostics = parse_diagnostics(&text);
        if !output.status.success() && diagnostics.errors.is_empty() {
            diagnostics.errors.push(BuildMessage::new(format!(
                "Build command '{program}' exited with {}",
                output.status
            )));
        }

        Ok(diagnostics)
    }
}
