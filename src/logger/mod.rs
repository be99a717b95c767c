//! Logging initialisation via tracing-subscriber.
//!
//! Two phases:
//!   1. [`setup_dispatch`]: a scoped subscriber writing to `logs/setup.log`,
//!      used while the config is still being loaded.
//!   2. [`init`]: the global subscriber: stdout plus a size-rotating
//!      `logs/app.log`.

mod format;
mod rotate;

pub use format::{LineFormat, LocalTimestamp, TIMESTAMP_FORMAT};
pub use rotate::RotatingFile;

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::level_filters::LevelFilter;
use tracing::{Dispatch, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};

use crate::config::LoggingConfig;
use crate::error::AppError;

/// Bootstrap log location, relative to the working directory. Used before
/// the config (and its `[logging]` section) has been read.
pub const BOOTSTRAP_DIR: &str = "logs";
pub const BOOTSTRAP_FILE: &str = "setup.log";

/// Where the global subscriber ended up writing.
#[derive(Debug, Clone)]
pub struct LogTargets {
    pub log_dir: PathBuf,
    pub log_file: PathBuf,
    /// Nearest ancestor of the start directory that already had a logs dir.
    pub working_root: Option<PathBuf>,
}

/// Resolve the logs directory against `cwd` unless it is already absolute.
pub fn resolve_log_dir(dir: &Path, cwd: &Path) -> PathBuf {
    if dir.is_absolute() { dir.to_path_buf() } else { cwd.join(dir) }
}

/// Walk up from `start` and return the first directory containing `dir_name`.
/// Returns `None` once the filesystem root has been checked.
pub fn find_root(start: &Path, dir_name: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|candidate| candidate.join(dir_name).is_dir())
        .map(Path::to_path_buf)
}

/// Build a dispatcher for the bootstrap phase, appending to
/// `<log_dir>/<setup_file>` at INFO.
///
/// Install it with [`tracing::dispatcher::with_default`] around config
/// loading; it is dropped once the global subscriber takes over.
pub fn setup_dispatch(log_dir: &Path, setup_file: &str) -> Result<Dispatch, AppError> {
    fs::create_dir_all(log_dir).map_err(|e| {
        AppError::Logger(format!("cannot create log dir '{}': {e}", log_dir.display()))
    })?;
    let path = log_dir.join(setup_file);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| AppError::Logger(format!("failed to open '{}': {e}", path.display())))?;

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(LevelFilter::INFO)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .event_format(LineFormat::default())
        .finish();
    Ok(Dispatch::new(subscriber))
}

/// Move the bootstrap log to `<logging.dir>/<logging.setup_file>`.
///
/// Content is appended to the target so earlier runs are kept. Nothing
/// happens when the configured location is the bootstrap one.
pub fn relocate_setup_log(
    bootstrap: &Path,
    logging: &LoggingConfig,
    cwd: &Path,
) -> Result<PathBuf, AppError> {
    let target = resolve_log_dir(&logging.dir, cwd).join(&logging.setup_file);
    if target == bootstrap || !bootstrap.exists() {
        return Ok(target);
    }

    let relocate = || -> std::io::Result<()> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = fs::read(bootstrap)?;
        OpenOptions::new().create(true).append(true).open(&target)?.write_all(&content)?;
        fs::remove_file(bootstrap)
    };
    relocate().map_err(|e| {
        AppError::Logger(format!(
            "cannot move '{}' to '{}': {e}",
            bootstrap.display(),
            target.display()
        ))
    })?;
    Ok(target)
}

/// Initialise the global tracing subscriber.
///
/// `level` takes precedence; `RUST_LOG` is only consulted when `level` is
/// not a recognised level name.
pub fn init(level: &str, logging: &LoggingConfig, cwd: &Path) -> Result<LogTargets, AppError> {
    let filter = build_filter(level, std::env::var("RUST_LOG").ok().as_deref())?;

    let working_root = find_root(cwd, &logging.dir);
    let log_dir = resolve_log_dir(&logging.dir, cwd);
    fs::create_dir_all(&log_dir).map_err(|e| {
        AppError::Logger(format!("cannot create log dir '{}': {e}", log_dir.display()))
    })?;

    let log_file = log_dir.join(&logging.file);
    let file = RotatingFile::open(&log_file, logging.max_bytes, logging.backup_count).map_err(|e| {
        AppError::Logger(format!("failed to open log file '{}': {e}", log_file.display()))
    })?;
    let file = Mutex::new(file);

    let writer = if logging.console {
        BoxMakeWriter::new(std::io::stdout.and(file))
    } else {
        BoxMakeWriter::new(file)
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .event_format(LineFormat::default())
        .try_init()
        .map_err(|e| AppError::Logger(format!("failed to set subscriber: {e}")))?;

    let program = std::env::current_exe()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| env!("CARGO_PKG_NAME").to_string());
    info!(
        program = %program,
        working_dir = %working_root.as_deref().unwrap_or(Path::new("/")).display(),
        log_file = %log_file.display(),
        "logger initialised"
    );

    Ok(LogTargets { log_dir, log_file, working_root })
}

/// `level` must be a plain level name. Otherwise `rust_log` (the value of
/// `RUST_LOG`) is used as a full directive string.
fn build_filter(level: &str, rust_log: Option<&str>) -> Result<EnvFilter, AppError> {
    let level_err = match parse_level(level) {
        Ok(filter) => return Ok(EnvFilter::default().add_directive(filter.into())),
        Err(e) => e,
    };
    let Some(directives) = rust_log.filter(|d| !d.trim().is_empty()) else {
        return Err(AppError::Logger(format!("{level_err}; RUST_LOG is not set")));
    };
    EnvFilter::try_new(directives).map_err(|env_err| {
        AppError::Logger(format!("{level_err}; RUST_LOG parse failed: {env_err}"))
    })
}

/// Parse a log level string into a [`LevelFilter`], returning an error on
/// unrecognised values. Useful for validating config before initialising.
pub fn parse_level(level: &str) -> Result<LevelFilter, AppError> {
    if level.is_empty() {
        return Err(AppError::Logger("log level must not be empty".into()));
    }
    level
        .parse::<LevelFilter>()
        .map_err(|_| AppError::Logger(format!("unrecognised log level: '{level}'")))
}
