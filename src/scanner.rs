//! Threshold-driven recursive scan that writes one listing per expanded
//! directory.
//!
//! Directories are visited depth-first, strictly one after another: a child
//! is measured only after its parent's listing is on disk. A failure in one
//! directory turns that directory into a leaf and never stops the scan.

use std::collections::HashSet;
use std::fs;
use std::ops::AddAssign;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::measure::Measurer;
use crate::paths;
use crate::size_unit::{self, GIB};
use crate::snapshot::{listing_path, Listing, Manifest, Run, RunId, FORMAT_VERSION};

pub const DEFAULT_THRESHOLD_GIB: f64 = 2.0;

/// Immutable settings shared by every level of the recursion.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanConfig {
    /// Absolute, normalized scan root.
    pub root: PathBuf,
    /// Children at least this large (bytes) are expanded.
    pub threshold_bytes: f64,
    /// Expand children that live on a different filesystem than the root.
    pub follow_mounts: bool,
    /// Demote per-record parse warnings to debug.
    pub quiet: bool,
}

impl ScanConfig {
    pub fn new(root: PathBuf, threshold_gib: f64) -> Self {
        Self {
            root: paths::normalize(&root),
            threshold_bytes: threshold_gib * GIB,
            follow_mounts: true,
            quiet: false,
        }
    }
}

/// What a scan did, for the closing log line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub listings_written: u64,
    pub leaves: u64,
    pub measurement_failures: u64,
    pub unparsed_records: u64,
    pub write_failures: u64,
}

impl AddAssign for ScanSummary {
    fn add_assign(&mut self, other: Self) {
        self.listings_written += other.listings_written;
        self.leaves += other.leaves;
        self.measurement_failures += other.measurement_failures;
        self.unparsed_records += other.unparsed_records;
        self.write_failures += other.write_failures;
    }
}

pub struct Scanner<'a, M: Measurer + ?Sized> {
    measurer: &'a M,
    run_dir: PathBuf,
    config: ScanConfig,
    root_device: Option<u64>,
}

impl<'a, M: Measurer + ?Sized> Scanner<'a, M> {
    pub fn new(measurer: &'a M, run_dir: impl Into<PathBuf>, config: ScanConfig) -> Self {
        let root_device = device_of(&config.root);
        Self {
            measurer,
            run_dir: run_dir.into(),
            config,
            root_device,
        }
    }

    /// Scan from the configured root.
    pub fn scan(&self) -> ScanSummary {
        self.scan_dir(&self.config.root)
    }

    fn scan_dir(&self, dir: &Path) -> ScanSummary {
        let mut summary = ScanSummary::default();
        info!(dir = %dir.display(), "analyzing");

        let listing = match self.measurer.measure(dir) {
            Ok(listing) => listing,
            Err(err) => {
                warn!(dir = %dir.display(), error = %err, "measurement failed, leaving as leaf");
                summary.measurement_failures += 1;
                summary.leaves += 1;
                return summary;
            }
        };
        if listing.is_empty() {
            debug!(dir = %dir.display(), "no usable measurement, leaving as leaf");
            summary.leaves += 1;
            return summary;
        }

        let target = match self.persist(dir, &listing) {
            Ok(target) => target,
            Err(err) => {
                error!(dir = %dir.display(), error = %err, "could not save listing");
                summary.write_failures += 1;
                return summary;
            }
        };
        info!(path = %target.display(), "saved listing");
        summary.listings_written += 1;

        for child in self.children_to_expand(dir, &listing, &mut summary) {
            summary += self.scan_dir(&child);
        }
        summary
    }

    fn persist(&self, dir: &Path, listing: &Listing) -> Result<PathBuf> {
        let target = listing_path(&self.run_dir, &self.config.root, dir)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|err| Error::io(parent, err))?;
        }
        listing.write_to(&target)?;
        Ok(target)
    }

    fn children_to_expand(&self, dir: &Path, listing: &Listing, summary: &mut ScanSummary) -> Vec<PathBuf> {
        let dir = paths::normalize(dir);
        let mut seen = HashSet::new();
        let mut expand = Vec::new();

        for record in listing.records() {
            let path = paths::normalize(&record.path);
            if path == dir {
                continue;
            }

            let bytes = match record.bytes() {
                Ok(bytes) => bytes,
                Err(err) => {
                    if self.config.quiet {
                        debug!(path = %record.path.display(), error = %err, "skipping record with unparseable size");
                    } else {
                        warn!(path = %record.path.display(), error = %err, "skipping record with unparseable size");
                    }
                    summary.unparsed_records += 1;
                    continue;
                }
            };
            if bytes < self.config.threshold_bytes {
                continue;
            }
            if !path.starts_with(&dir) {
                warn!(path = %path.display(), dir = %dir.display(), "record is not below the measured directory");
                continue;
            }
            if !self.is_expandable_dir(&path) {
                continue;
            }
            if seen.insert(path.clone()) {
                info!(path = %path.display(), size = %record.size_label, "found large subdirectory");
                expand.push(path);
            }
        }
        expand
    }

    fn is_expandable_dir(&self, path: &Path) -> bool {
        if !path.is_dir() {
            return false;
        }
        if self.config.follow_mounts {
            return true;
        }
        match (self.root_device, device_of(path)) {
            (Some(root), Some(child)) if root != child => {
                info!(path = %path.display(), "not following into another filesystem");
                false
            }
            _ => true,
        }
    }
}

#[cfg(unix)]
fn device_of(path: &Path) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    fs::metadata(path).ok().map(|metadata| metadata.dev())
}

#[cfg(not(unix))]
fn device_of(_path: &Path) -> Option<u64> {
    None
}

/// Create a fresh run under `output_base`, scan into it, and record the
/// manifest around the scan.
pub fn run_scan<M: Measurer + ?Sized>(
    measurer: &M,
    output_base: &Path,
    config: ScanConfig,
) -> Result<(Run, ScanSummary)> {
    let run = Run::create(output_base, RunId::now())?;
    let mut manifest = Manifest {
        format_version: FORMAT_VERSION,
        root: config.root.clone(),
        threshold_bytes: config.threshold_bytes,
        follow_mounts: config.follow_mounts,
        backend: measurer.name().to_string(),
        started_at: Local::now().to_rfc3339(),
        finished_at: None,
    };
    if let Err(err) = run.write_manifest(&manifest) {
        warn!(error = %err, "could not write run manifest");
    }

    info!(
        root = %config.root.display(),
        threshold = %size_unit::format(config.threshold_bytes as u64),
        run = %run.id(),
        "starting scan"
    );
    let summary = Scanner::new(measurer, run.dir(), config).scan();

    manifest.finished_at = Some(Local::now().to_rfc3339());
    if let Err(err) = run.write_manifest(&manifest) {
        warn!(error = %err, "could not finalize run manifest");
    }
    Ok((run, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MeasureError;
    use crate::snapshot::{UsageRecord, LISTING_FILE};
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Replays canned listings and remembers which directories were asked for.
    #[derive(Default)]
    struct ScriptedMeasurer {
        listings: HashMap<PathBuf, Vec<(&'static str, PathBuf)>>,
        failing: HashSet<PathBuf>,
        calls: RefCell<Vec<PathBuf>>,
    }

    impl ScriptedMeasurer {
        fn answer(&mut self, dir: &Path, rows: Vec<(&'static str, PathBuf)>) {
            self.listings.insert(dir.to_path_buf(), rows);
        }
    }

    impl Measurer for ScriptedMeasurer {
        fn measure(&self, dir: &Path) -> std::result::Result<Listing, MeasureError> {
            self.calls.borrow_mut().push(dir.to_path_buf());
            if self.failing.contains(dir) {
                return Err(MeasureError::Unreadable {
                    dir: dir.to_path_buf(),
                    details: "scripted failure".to_string(),
                });
            }
            let rows = self.listings.get(dir).cloned().unwrap_or_default();
            Ok(Listing::new(
                rows.into_iter()
                    .map(|(size, path)| UsageRecord::new(size, path))
                    .collect(),
            ))
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn home_fixture() -> (tempfile::TempDir, PathBuf) {
        let tmp = tempfile::tempdir().unwrap();
        let home = tmp.path().join("u");
        for dir in ["video/raw", "docs", "games"] {
            fs::create_dir_all(home.join(dir)).unwrap();
        }
        fs::write(home.join("disk.iso"), b"not really big").unwrap();
        (tmp, home)
    }

    #[test]
    fn test_expands_only_large_directories() {
        let (tmp, home) = home_fixture();
        let out = tmp.path().join("out");

        let mut measurer = ScriptedMeasurer::default();
        measurer.answer(
            &home,
            vec![
                ("10G", home.clone()),
                ("8G", home.join("video")),
                ("5G", home.join("disk.iso")),
                ("500M", home.join("docs")),
            ],
        );
        measurer.answer(
            &home.join("video"),
            vec![("8G", home.join("video")), ("3G", home.join("video/raw"))],
        );

        let summary = Scanner::new(&measurer, &out, ScanConfig::new(home.clone(), 2.0)).scan();

        assert_eq!(
            *measurer.calls.borrow(),
            vec![home.clone(), home.join("video"), home.join("video/raw")]
        );
        assert!(out.join(LISTING_FILE).is_file());
        assert!(out.join("video").join(LISTING_FILE).is_file());
        assert!(!out.join("video/raw").join(LISTING_FILE).exists());
        assert!(!out.join("docs").exists());
        assert_eq!(summary.listings_written, 2);
        assert_eq!(summary.leaves, 1);

        let saved = fs::read_to_string(out.join(LISTING_FILE)).unwrap();
        let expected = format!(
            "10G\t{}\n8G\t{}\n5G\t{}\n500M\t{}\n",
            home.display(),
            home.join("video").display(),
            home.join("disk.iso").display(),
            home.join("docs").display()
        );
        assert_eq!(saved, expected);
    }

    #[test]
    fn test_threshold_is_inclusive_and_duplicates_expand_once() {
        let (tmp, home) = home_fixture();
        let out = tmp.path().join("out");

        let mut measurer = ScriptedMeasurer::default();
        measurer.answer(
            &home,
            vec![
                ("9G", home.clone()),
                ("2G", home.join("games")),
                ("2.0G", home.join("games/")),
                ("1.9G", home.join("docs")),
            ],
        );

        Scanner::new(&measurer, &out, ScanConfig::new(home.clone(), 2.0)).scan();
        assert_eq!(*measurer.calls.borrow(), vec![home.clone(), home.join("games")]);
    }

    #[test]
    fn test_bad_sizes_and_failures_do_not_stop_the_scan() {
        let (tmp, home) = home_fixture();
        let out = tmp.path().join("out");

        let mut measurer = ScriptedMeasurer::default();
        measurer.answer(
            &home,
            vec![
                ("12G", home.clone()),
                ("lots", home.join("docs")),
                ("6G", home.join("video")),
                ("4G", home.join("games")),
            ],
        );
        measurer.failing.insert(home.join("video"));
        measurer.answer(&home.join("games"), vec![("4G", home.join("games"))]);

        let summary = Scanner::new(&measurer, &out, ScanConfig::new(home.clone(), 2.0)).scan();

        assert_eq!(summary.unparsed_records, 1);
        assert_eq!(summary.measurement_failures, 1);
        assert_eq!(summary.listings_written, 2);
        assert!(!out.join("video").exists());
        assert!(out.join("games").join(LISTING_FILE).is_file());

        let quiet_out = tmp.path().join("quiet");
        let mut config = ScanConfig::new(home.clone(), 2.0);
        config.quiet = true;
        let quiet_summary = Scanner::new(&measurer, &quiet_out, config).scan();
        assert_eq!(quiet_summary, summary);
    }

    #[test]
    fn test_empty_root_measurement_writes_nothing() {
        let (tmp, home) = home_fixture();
        let out = tmp.path().join("out");
        fs::create_dir_all(&out).unwrap();

        let measurer = ScriptedMeasurer::default();
        let summary = Scanner::new(&measurer, &out, ScanConfig::new(home, 2.0)).scan();

        assert_eq!(summary.listings_written, 0);
        assert!(!out.join(LISTING_FILE).exists());
    }

    #[test]
    fn test_same_filesystem_still_expands_without_following_mounts() {
        let (tmp, home) = home_fixture();
        let out = tmp.path().join("out");

        let mut measurer = ScriptedMeasurer::default();
        measurer.answer(&home, vec![("9G", home.clone()), ("7G", home.join("games"))]);

        let mut config = ScanConfig::new(home.clone(), 2.0);
        config.follow_mounts = false;
        Scanner::new(&measurer, &out, config).scan();

        assert_eq!(measurer.calls.borrow().len(), 2);
    }

    #[test]
    fn test_run_scan_writes_manifest() {
        let (tmp, home) = home_fixture();
        let base = tmp.path().join("output");

        let mut measurer = ScriptedMeasurer::default();
        measurer.answer(&home, vec![("1G", home.clone())]);

        let (run, summary) = run_scan(&measurer, &base, ScanConfig::new(home.clone(), 2.0)).unwrap();
        assert_eq!(summary.listings_written, 1);
        assert!(run.dir().starts_with(&base));

        let manifest = run.read_manifest().unwrap().unwrap();
        assert_eq!(manifest.root, home);
        assert_eq!(manifest.backend, "scripted");
        assert!(manifest.finished_at.is_some());
    }
}
