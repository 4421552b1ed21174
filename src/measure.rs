//! Measuring one directory level: the directory itself plus its direct
//! child directories, largest first.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::MeasureError;
use crate::size_unit;
use crate::snapshot::{Listing, UsageRecord};

/// Something that can report per-entry disk usage for one directory level.
pub trait Measurer {
    /// Records for `dir` and its immediate child directories, sorted by
    /// descending size. An empty listing means nothing usable was measured.
    fn measure(&self, dir: &Path) -> Result<Listing, MeasureError>;

    /// Short backend name recorded in the run manifest.
    fn name(&self) -> &'static str;
}

/// Which measurer the scanner drives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Shell out to `du -h -d 1`.
    #[default]
    Du,
    /// Walk the tree in-process.
    Walk,
}

/// Stable sort, largest decoded size first; undecodable labels sink as zero.
pub fn sort_by_size_desc(records: &mut [UsageRecord]) {
    records.sort_by(|a, b| {
        size_unit::parse_or_zero(&b.size_label).total_cmp(&size_unit::parse_or_zero(&a.size_label))
    });
}

/// Runs `du -h -d 1 <dir>` (optionally under `sudo`) and orders the output
/// like `sort -hr`.
#[derive(Debug, Clone)]
pub struct DuMeasurer {
    program: PathBuf,
    elevated: bool,
    quiet: bool,
}

impl DuMeasurer {
    pub fn new(elevated: bool, quiet: bool) -> Self {
        Self {
            program: PathBuf::from("du"),
            elevated,
            quiet,
        }
    }

    fn command(&self, dir: &Path) -> (Command, &'static str) {
        let (mut cmd, program) = if self.elevated {
            let mut cmd = Command::new("sudo");
            cmd.arg(&self.program);
            (cmd, "sudo")
        } else {
            (Command::new(&self.program), "du")
        };
        cmd.args(["-h", "-d", "1"]).arg(dir);
        cmd.stdout(Stdio::piped());
        cmd.stderr(if self.quiet { Stdio::null() } else { Stdio::piped() });
        (cmd, program)
    }
}

impl Measurer for DuMeasurer {
    fn measure(&self, dir: &Path) -> Result<Listing, MeasureError> {
        let (mut cmd, program) = self.command(dir);
        let output = cmd.output().map_err(|source| MeasureError::Spawn {
            program,
            dir: dir.to_path_buf(),
            source,
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if self.quiet {
                debug!(dir = %dir.display(), status = %output.status, "du exited with failure");
            } else {
                warn!(
                    dir = %dir.display(),
                    status = %output.status,
                    details = %stderr.trim(),
                    "du exited with failure, keeping captured output"
                );
            }
        }

        let mut records = Listing::parse(&output.stdout).into_records();
        sort_by_size_desc(&mut records);
        Ok(Listing::new(records))
    }

    fn name(&self) -> &'static str {
        "du"
    }
}
