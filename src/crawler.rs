use dashmap::{DashMap, DashSet};
use jwalk::WalkDir;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::ffi::OsString;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::MeasureError;
use crate::measure::Measurer;
use crate::size_unit;
use crate::snapshot::{Listing, UsageRecord};

/// In-process replacement for `du -d 1`: walks the whole subtree in parallel
/// and folds allocated sizes into the top-level child directories.
pub struct UsageCrawler {
    parallelism: usize,
}

impl UsageCrawler {
    pub fn new() -> Self {
        Self {
            parallelism: Self::processing_parallelism(),
        }
    }

    fn processing_parallelism() -> usize {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        (cores * 2).clamp(4, 64)
    }

    fn top_level_name(root_path: &Path, path: &Path) -> Option<(OsString, bool)> {
        let rel = path.strip_prefix(root_path).ok()?;
        let mut components = rel.components();
        let first = components.next()?;
        let has_more = components.next().is_some();
        Some((first.as_os_str().to_os_string(), has_more))
    }

    #[cfg(unix)]
    fn allocated_size(metadata: &Metadata) -> u64 {
        use std::os::unix::fs::MetadataExt;
        metadata.blocks().saturating_mul(512)
    }

    #[cfg(not(unix))]
    fn allocated_size(metadata: &Metadata) -> u64 {
        metadata.len()
    }

    /// Hard-linked files count once, like `du`.
    #[cfg(unix)]
    fn first_sighting(seen: &DashSet<(u64, u64)>, metadata: &Metadata) -> bool {
        use std::os::unix::fs::MetadataExt;
        if metadata.is_dir() || metadata.nlink() <= 1 {
            return true;
        }
        seen.insert((metadata.dev(), metadata.ino()))
    }

    #[cfg(not(unix))]
    fn first_sighting(_seen: &DashSet<(u64, u64)>, _metadata: &Metadata) -> bool {
        true
    }

    fn sizes(&self, root: &Path) -> (u64, Vec<(u64, PathBuf)>) {
        let entries: Vec<_> = WalkDir::new(root)
            .skip_hidden(false)
            .follow_links(false)
            .parallelism(jwalk::Parallelism::RayonNewPool(self.parallelism))
            .into_iter()
            .filter_map(|entry| entry.ok())
            .collect();

        let total_size = AtomicU64::new(0);
        let child_sizes: DashMap<OsString, u64> = DashMap::new();
        let seen = DashSet::new();

        let process_entries = || {
            entries.par_iter().for_each(|entry| {
                let Ok(metadata) = entry.metadata() else {
                    return;
                };
                if !Self::first_sighting(&seen, &metadata) {
                    return;
                }

                let size = Self::allocated_size(&metadata);
                total_size.fetch_add(size, Ordering::Relaxed);

                if entry.depth == 0 {
                    return;
                }
                if let Some((name, nested)) = Self::top_level_name(root, &entry.path()) {
                    if nested || metadata.is_dir() {
                        *child_sizes.entry(name).or_insert(0) += size;
                    }
                }
            })
        };

        match ThreadPoolBuilder::new().num_threads(self.parallelism).build() {
            Ok(pool) => pool.install(process_entries),
            Err(_) => process_entries(),
        }

        let children = child_sizes
            .into_iter()
            .map(|(name, size)| (size, root.join(name)))
            .collect();
        (total_size.load(Ordering::Relaxed), children)
    }
}

impl Default for UsageCrawler {
    fn default() -> Self {
        Self::new()
    }
}

impl Measurer for UsageCrawler {
    fn measure(&self, dir: &Path) -> Result<Listing, MeasureError> {
        let metadata = std::fs::metadata(dir).map_err(|err| MeasureError::Unreadable {
            dir: dir.to_path_buf(),
            details: err.to_string(),
        })?;
        if !metadata.is_dir() {
            return Err(MeasureError::Unreadable {
                dir: dir.to_path_buf(),
                details: "not a directory".to_string(),
            });
        }

        let (total, mut children) = self.sizes(dir);
        children.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

        let records = std::iter::once((total, dir.to_path_buf()))
            .chain(children)
            .map(|(size, path)| UsageRecord::new(size_unit::format(size), path))
            .collect();
        Ok(Listing::new(records))
    }

    fn name(&self) -> &'static str {
        "walk"
    }
}
