//! On-disk snapshot format shared by the scanner and the browser.
//!
//! A run lives in `<output>/<YYYY-MM-DD_HH-MM-SS>/`. Every expanded
//! directory gets a `disk_usage.txt` at its position relative to the scan
//! root; the root's listing sits directly in the run directory. A missing
//! listing means the directory was a leaf of the scan.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Duration, Local, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result, SizeParseError};
use crate::paths;
use crate::size_unit;

pub const LISTING_FILE: &str = "disk_usage.txt";
pub const MANIFEST_FILE: &str = ".snapshot.toml";
pub const FORMAT_VERSION: u32 = 1;
pub const RUN_ID_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// One `size<TAB>path` line of a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageRecord {
    pub size_label: String,
    pub path: PathBuf,
}

impl UsageRecord {
    pub fn new(size_label: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            size_label: size_label.into(),
            path: path.into(),
        }
    }

    pub fn bytes(&self) -> std::result::Result<f64, SizeParseError> {
        size_unit::parse(&self.size_label)
    }

    /// Decode a single line; `None` for anything that is not `label<TAB>path`.
    pub fn from_line(line: &[u8]) -> Option<Self> {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let tab = line.iter().position(|&b| b == b'\t')?;
        let (label, path) = (&line[..tab], &line[tab + 1..]);
        let label = std::str::from_utf8(label).ok()?.trim();
        if label.is_empty() || path.is_empty() {
            return None;
        }
        Some(Self::new(label, path_from_bytes(path)))
    }

    fn write_line(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.size_label.as_bytes());
        out.push(b'\t');
        out.extend_from_slice(&path_to_bytes(&self.path));
        out.push(b'\n');
    }
}

#[cfg(unix)]
fn path_from_bytes(bytes: &[u8]) -> PathBuf {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;
    PathBuf::from(OsStr::from_bytes(bytes))
}

#[cfg(not(unix))]
fn path_from_bytes(bytes: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(bytes).into_owned())
}

#[cfg(unix)]
fn path_to_bytes(path: &Path) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    path.as_os_str().as_bytes().to_vec()
}

#[cfg(not(unix))]
fn path_to_bytes(path: &Path) -> Vec<u8> {
    path.to_string_lossy().into_owned().into_bytes()
}

/// Records for one directory and its direct children, in producer order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    records: Vec<UsageRecord>,
}

impl Listing {
    pub fn new(records: Vec<UsageRecord>) -> Self {
        Self { records }
    }

    /// Parse listing text, skipping lines that are not `label<TAB>path`.
    pub fn parse(bytes: &[u8]) -> Self {
        let records = bytes
            .split(|&b| b == b'\n')
            .filter(|line| !line.is_empty())
            .filter_map(|line| {
                let record = UsageRecord::from_line(line);
                if record.is_none() {
                    debug!(line = %String::from_utf8_lossy(line), "skipping malformed listing line");
                }
                record
            })
            .collect();
        Self { records }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for record in &self.records {
            record.write_line(&mut out);
        }
        out
    }

    pub fn records(&self) -> &[UsageRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<UsageRecord> {
        self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Size label of the record for exactly `path`.
    pub fn size_of(&self, path: &Path) -> Option<&str> {
        self.records
            .iter()
            .find(|record| paths::same_path(&record.path, path))
            .map(|record| record.size_label.as_str())
    }

    /// Records whose parent directory is `dir`, excluding `dir` itself.
    pub fn children_of<'a>(&'a self, dir: &'a Path) -> impl Iterator<Item = &'a UsageRecord> + 'a {
        let dir = paths::normalize(dir);
        self.records.iter().filter(move |record| {
            let path = paths::normalize(&record.path);
            path != dir && path.parent() == Some(dir.as_path())
        })
    }

    /// The directory this listing describes: the record that contains every
    /// other record, falling back to the first (largest) one.
    pub fn measured_dir(&self) -> Option<PathBuf> {
        let normalized: Vec<PathBuf> = self
            .records
            .iter()
            .map(|record| paths::normalize(&record.path))
            .collect();
        normalized
            .iter()
            .find(|candidate| normalized.iter().all(|path| path.starts_with(candidate)))
            .or_else(|| normalized.first())
            .cloned()
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_bytes()).map_err(|err| Error::io(path, err))
    }

    /// Read a listing file. `None` when the file does not exist; an
    /// unreadable file is logged and yields an empty listing.
    pub fn read_from(path: &Path) -> Option<Self> {
        match fs::read(path) {
            Ok(bytes) => {
                let listing = Self::parse(&bytes);
                if listing.is_empty() && bytes.iter().any(|b| !b.is_ascii_whitespace()) {
                    warn!(path = %path.display(), "listing has no valid lines, treating as empty");
                }
                Some(listing)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "listing unreadable, treating as empty");
                Some(Self::default())
            }
        }
    }
}

/// Where the listing for `target` lives inside `run_dir`, given the scan root.
pub fn listing_path(run_dir: &Path, root: &Path, target: &Path) -> Result<PathBuf> {
    let relative = paths::relative_to(root, target)?;
    Ok(run_dir.join(relative).join(LISTING_FILE))
}

/// Timestamp naming one run directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunId(NaiveDateTime);

impl RunId {
    pub fn now() -> Self {
        let now = Local::now().naive_local();
        Self(now.with_nanosecond(0).unwrap_or(now))
    }

    pub fn from_datetime(at: NaiveDateTime) -> Self {
        Self(at)
    }

    /// Accept only names that are exactly `YYYY-MM-DD_HH-MM-SS`.
    pub fn parse(name: &str) -> Option<Self> {
        let at = NaiveDateTime::parse_from_str(name, RUN_ID_FORMAT).ok()?;
        let id = Self(at);
        (id.label() == name).then_some(id)
    }

    pub fn label(&self) -> String {
        self.0.format(RUN_ID_FORMAT).to_string()
    }

    /// Friendly time for the run picker, relative to `now`.
    pub fn describe(&self, now: NaiveDateTime) -> String {
        let date = self.0.date();
        if date == now.date() {
            format!("Today, {}", self.0.format("%I:%M %p"))
        } else if date == (now - Duration::days(1)).date() {
            format!("Yesterday, {}", self.0.format("%I:%M %p"))
        } else {
            self.0.format("%b %d, %Y, %I:%M %p").to_string()
        }
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Metadata the scanner leaves next to the root listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u32,
    pub root: PathBuf,
    pub threshold_bytes: f64,
    pub follow_mounts: bool,
    pub backend: String,
    pub started_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
}

/// One scan's output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    id: RunId,
    dir: PathBuf,
}

impl Run {
    pub fn open(output_base: &Path, id: RunId) -> Self {
        Self {
            dir: output_base.join(id.label()),
            id,
        }
    }

    pub fn create(output_base: &Path, id: RunId) -> Result<Self> {
        let run = Self::open(output_base, id);
        fs::create_dir_all(&run.dir).map_err(|err| Error::io(&run.dir, err))?;
        Ok(run)
    }

    pub fn id(&self) -> RunId {
        self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn root_listing_path(&self) -> PathBuf {
        self.dir.join(LISTING_FILE)
    }

    pub fn root_listing(&self) -> Option<Listing> {
        Listing::read_from(&self.root_listing_path())
    }

    pub fn write_manifest(&self, manifest: &Manifest) -> Result<()> {
        let path = self.dir.join(MANIFEST_FILE);
        let text = toml::to_string(manifest).map_err(|err| Error::Manifest {
            path: path.clone(),
            details: err.to_string(),
        })?;
        fs::write(&path, text).map_err(|err| Error::io(&path, err))
    }

    pub fn read_manifest(&self) -> Result<Option<Manifest>> {
        let path = self.dir.join(MANIFEST_FILE);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(Error::io(&path, err)),
        };
        let manifest: Manifest = toml::from_str(&text).map_err(|err| Error::Manifest {
            path: path.clone(),
            details: err.to_string(),
        })?;
        if manifest.format_version > FORMAT_VERSION {
            return Err(Error::Manifest {
                path,
                details: format!("unsupported format_version {}", manifest.format_version),
            });
        }
        Ok(Some(manifest))
    }

    /// The scan root, from the manifest when usable, else from `root_listing`.
    pub fn root_path(&self, root_listing: &Listing) -> Option<PathBuf> {
        match self.read_manifest() {
            Ok(Some(manifest)) => return Some(paths::normalize(&manifest.root)),
            Ok(None) => {}
            Err(err) => warn!(run = %self.id, error = %err, "ignoring run manifest"),
        }
        root_listing.measured_dir()
    }

    /// Find the listing describing `target`'s children.
    ///
    /// `None` is the normal answer for a directory the scan did not expand.
    pub fn resolve_listing(&self, root: &Path, target: &Path) -> Option<Listing> {
        let path = match listing_path(&self.dir, root, target) {
            Ok(path) => path,
            Err(err) => {
                debug!(error = %err, "no listing outside the scan root");
                return None;
            }
        };
        debug!(path = %path.display(), "resolving listing");
        Listing::read_from(&path)
    }
}

/// Runs under `output_base`, newest first. Unrelated directories are ignored.
pub fn discover_runs(output_base: &Path) -> Vec<Run> {
    let entries = match fs::read_dir(output_base) {
        Ok(entries) => entries,
        Err(err) => {
            debug!(path = %output_base.display(), error = %err, "no output directory");
            return Vec::new();
        }
    };

    let mut runs: Vec<Run> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false))
        .filter_map(|entry| RunId::parse(entry.file_name().to_str()?))
        .map(|id| Run::open(output_base, id))
        .collect();

    runs.sort_by(|a, b| b.id.cmp(&a.id));
    runs
}
