//! Error types shared by the scanner and the browser.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, Error>;

/// A size label that could not be decoded into bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid size format: {label:?}")]
pub struct SizeParseError {
    pub label: String,
}

/// The external measurement facility could not be run at all.
///
/// A tool that runs but exits non-zero is not an error: whatever it
/// printed is still returned.
#[derive(Debug, Error)]
pub enum MeasureError {
    #[error("failed to launch {program} for {dir}: {source}")]
    Spawn {
        program: &'static str,
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot measure {dir}: {details}")]
    Unreadable { dir: PathBuf, details: String },
}

/// Faults surfaced by the snapshot store and configuration layer.
#[derive(Debug, Error)]
pub enum Error {
    #[error("IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not inside the scan root {root}")]
    OutsideRoot { path: PathBuf, root: PathBuf },

    #[error("config parse failure in {path}: {details}")]
    ConfigParse { path: PathBuf, details: String },

    #[error("manifest failure in {path}: {details}")]
    Manifest { path: PathBuf, details: String },

    #[error("cannot open log file {path}: {details}")]
    LogFile { path: PathBuf, details: String },
}

impl Error {
    /// Convenience constructor for IO errors with a known path.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

/// Why a run could not be opened for browsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OpenRunError {
    #[error("run {run} has no root listing")]
    MissingListing { run: String },

    #[error("run {run} has an empty root listing")]
    EmptyListing { run: String },
}
