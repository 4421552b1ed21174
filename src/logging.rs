use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{Error, Result};

/// Environment variable holding the tracing filter, e.g. `dusnap=debug`.
pub const LOG_ENV: &str = "DUSNAP_LOG";

fn filter_layer(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_filter))
}

fn file_writer(path: &Path) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| Error::LogFile {
            path: path.to_path_buf(),
            details: "no file name".to_string(),
        })?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name)
        .build(directory)
        .map_err(|err| Error::LogFile {
            path: path.to_path_buf(),
            details: err.to_string(),
        })?;
    Ok(tracing_appender::non_blocking(appender))
}

/// Log to stdout, and additionally to `log_file` when given. Keep the guard
/// alive until exit so buffered file output is flushed.
pub fn init_console(default_filter: &str, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let (file_layer, guard) = match log_file {
        Some(path) => {
            let (writer, guard) = file_writer(path)?;
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stdout)
                .with_target(false)
                .without_time(),
        )
        .with(file_layer)
        .with(filter_layer(default_filter))
        .init();

    Ok(guard)
}

/// Log only to `log_file`; used while the terminal belongs to the UI.
pub fn init_file(default_filter: &str, log_file: &Path) -> Result<WorkerGuard> {
    let (writer, guard) = file_writer(log_file)?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .with(filter_layer(default_filter))
        .init();

    Ok(guard)
}
