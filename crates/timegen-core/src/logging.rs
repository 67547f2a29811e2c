//! Tracing subscriber setup.
//!
//! Diagnostics go to stderr so command output on stdout stays clean. The filter
//! comes from `TIMEGEN_LOG` (default `warn`, or `debug` with `--verbose`).
//! Setting `TIMEGEN_LOG_FILE` additionally writes every event to that file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

pub const LOG_ENV: &str = "TIMEGEN_LOG";
pub const LOG_FILE_ENV: &str = "TIMEGEN_LOG_FILE";

/// Keeps the file writer alive; drop it last so buffered lines are flushed.
#[must_use = "dropping the guard stops the log file writer"]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Builds the level filter from an explicit directive string.
fn filter_from(directives: Option<&str>, verbose: bool) -> EnvFilter {
    let fallback = if verbose { "debug" } else { "warn" };
    directives
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(fallback))
}

/// Installs the global subscriber.
///
/// A second call is a no-op, so tests may call it freely.
pub fn init(verbose: bool) -> Result<LogGuard> {
    let directives = std::env::var(LOG_ENV).ok();
    let log_file = std::env::var(LOG_FILE_ENV)
        .ok()
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from);

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(filter_from(directives.as_deref(), verbose));

    let (file_layer, file_guard) = match log_file {
        Some(path) => {
            let (writer, guard) = file_writer(&path)?;
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(filter_from(directives.as_deref(), true));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    // already installed (tests, embedders)
    let _ = tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    Ok(LogGuard { _file: file_guard })
}

fn file_writer(path: &Path) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;
    Ok(tracing_appender::non_blocking(file))
}
