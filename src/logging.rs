//! Tracing setup for the server and the CLI.
//!
//! The server logs to stdout. The CLI logs to stderr because its stdout carries task tables
//! and JSON reports. Both also append to a log file through a non-blocking writer, at
//! `ESTIMATOR_LOG_FILE` or `logs/estimator.log`. Without `RUST_LOG`, the HTTP, database and
//! workbook crates are held at `warn`.
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, writer::BoxMakeWriter},
    prelude::*,
};

/// Environment variable overriding the log file location.
pub const LOG_FILE_ENV: &str = "ESTIMATOR_LOG_FILE";

const DEFAULT_LOG_FILE: &str = "logs/estimator.log";

const DEFAULT_DIRECTIVES: &str =
    "info,hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,sqlx=warn,calamine=warn";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Stream receiving console log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Console {
    /// Server processes.
    Stdout,
    /// Command-line tools whose stdout is program output.
    Stderr,
}

/// Install the global subscriber: console layer, optional file layer, shared filter.
pub fn init_tracing(console: Console) {
    let writer = match console {
        Console::Stdout => BoxMakeWriter::new(std::io::stdout),
        Console::Stderr => BoxMakeWriter::new(std::io::stderr),
    };
    let console_layer = fmt::layer().with_writer(writer).with_target(false).compact();

    let path = log_file_path(std::env::var(LOG_FILE_ENV).ok().as_deref());
    let file_layer = match file_writer(&path) {
        Ok(writer) => Some(
            fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .compact(),
        ),
        Err(err) => {
            eprintln!("File logging disabled, cannot open {}: {err}", path.display());
            None
        }
    };

    tracing_subscriber::registry()
        .with(default_filter())
        .with(console_layer)
        .with(file_layer)
        .init();
}

fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// Log file for a configured override; blank or missing selects `logs/estimator.log`.
pub fn log_file_path(configured: Option<&str>) -> PathBuf {
    configured
        .map(str::trim)
        .filter(|path| !path.is_empty())
        .map_or_else(|| PathBuf::from(DEFAULT_LOG_FILE), PathBuf::from)
}

fn file_writer(path: &Path) -> std::io::Result<NonBlocking> {
    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let (writer, guard) = tracing_appender::non_blocking(file);
    let _ = LOG_GUARD.set(guard);
    Ok(writer)
}
