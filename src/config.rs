//! Optional `dusnap.toml` settings. Command-line flags override them.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::measure::Backend;
use crate::scanner::DEFAULT_THRESHOLD_GIB;

pub const DEFAULT_CONFIG_FILE: &str = "dusnap.toml";
pub const DEFAULT_OUTPUT_DIR: &str = "./output";
pub const DEFAULT_BROWSER_LOG: &str = "browser_debug.log";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding one subdirectory per run.
    pub output: PathBuf,
    pub scan: ScanSettings,
    pub browse: BrowseSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output: PathBuf::from(DEFAULT_OUTPUT_DIR),
            scan: ScanSettings::default(),
            browse: BrowseSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Children at least this many GiB are scanned recursively.
    pub min_size_gib: f64,
    /// Run the measurer through `sudo`.
    pub sudo: bool,
    /// Hide the measurer's own error output.
    pub quiet: bool,
    /// Expand directories mounted from other filesystems.
    pub follow_mounts: bool,
    pub backend: Backend,
    pub log_file: Option<PathBuf>,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            min_size_gib: DEFAULT_THRESHOLD_GIB,
            sudo: false,
            quiet: false,
            follow_mounts: true,
            backend: Backend::Du,
            log_file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowseSettings {
    pub log_file: PathBuf,
}

impl Default for BrowseSettings {
    fn default() -> Self {
        Self {
            log_file: PathBuf::from(DEFAULT_BROWSER_LOG),
        }
    }
}

impl Config {
    /// Load `explicit` if given (it must exist), else `./dusnap.toml` when
    /// present, else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !path.is_file() {
                    return Ok(Self::default());
                }
                path
            }
        };
        let text = fs::read_to_string(&path).map_err(|err| Error::io(&path, err))?;
        Self::parse(&text, &path)
    }

    pub fn parse(text: &str, origin: &Path) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|err| Error::ConfigParse {
            path: origin.to_path_buf(),
            details: err.to_string(),
        })?;
        if !config.scan.min_size_gib.is_finite() || config.scan.min_size_gib < 0.0 {
            return Err(Error::ConfigParse {
                path: origin.to_path_buf(),
                details: format!("scan.min_size_gib must be >= 0, got {}", config.scan.min_size_gib),
            });
        }
        Ok(config)
    }
}
