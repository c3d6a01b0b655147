//! Tracing configuration and log routing.
//!
//! Logs go to stdout through a compact formatter and to a file. `DOCPIPE_LOG_FILE` selects the
//! file; otherwise logs are appended to `logs/docpipe.log`. The file writer is non-blocking.
use std::path::Path;
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_LOG_FILE: &str = "docpipe.log";

/// Configure tracing subscribers for stdout and file logging.
///
/// Respects `RUST_LOG` for filtering and defaults to `info`. A second call is a no-op.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(false).compact();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer);

    let result = match configure_file_writer() {
        Some(writer) => {
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .compact();
            registry.with(file_layer).try_init()
        }
        None => registry.try_init(),
    };
    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

/// Build a non-blocking writer for the log file, or `None` when it cannot be opened.
fn configure_file_writer() -> Option<NonBlocking> {
    match std::env::var("DOCPIPE_LOG_FILE") {
        Ok(path) if !path.trim().is_empty() => open_log_file(Path::new(&path)),
        _ => {
            if let Err(err) = std::fs::create_dir_all(DEFAULT_LOG_DIR) {
                eprintln!("Failed to create logs directory: {err}");
                return None;
            }
            let appender = tracing_appender::rolling::never(DEFAULT_LOG_DIR, DEFAULT_LOG_FILE);
            Some(install(tracing_appender::non_blocking(appender)))
        }
    }
}

fn open_log_file(path: &Path) -> Option<NonBlocking> {
    match std::fs::OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => Some(install(tracing_appender::non_blocking(file))),
        Err(err) => {
            eprintln!("Failed to open log file {}: {err}", path.display());
            None
        }
    }
}

fn install((writer, guard): (NonBlocking, WorkerGuard)) -> NonBlocking {
    let _ = LOG_GUARD.set(guard);
    writer
}
