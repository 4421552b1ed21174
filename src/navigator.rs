//! Browsing one run: current path, the listing that describes it, and the
//! selection cursor over the derived option list.
//!
//! The active listing is only ever replaced by a non-empty listing. When the
//! path moved to has no listing of its own (a leaf of the scan), the last
//! listing stays active and the leaf is shown from its parent's knowledge.

use std::ops::Range;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::OpenRunError;
use crate::paths;
use crate::size_unit;
use crate::snapshot::{Listing, Run};

pub const PARENT_LABEL: &str = ".. (Parent Directory)";
pub const UNKNOWN_SIZE: &str = "?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Parent,
    Child,
}

/// One row of the option list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub kind: EntryKind,
    pub name: String,
    pub path: PathBuf,
    pub size_label: String,
}

/// Selection and scroll offset over `len` rows shown `capacity` at a time.
///
/// After every mutation the selection lies in `[scroll, scroll + capacity)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    selected: usize,
    scroll: usize,
    capacity: usize,
}

impl Cursor {
    pub fn new(capacity: usize) -> Self {
        Self {
            selected: 0,
            scroll: 0,
            capacity: capacity.max(1),
        }
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn scroll(&self) -> usize {
        self.scroll
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn up(&mut self) {
        self.selected = self.selected.saturating_sub(1);
        self.keep_visible();
    }

    pub fn down(&mut self, len: usize) {
        if self.selected + 1 < len {
            self.selected += 1;
        }
        self.keep_visible();
    }

    pub fn reset(&mut self) {
        self.selected = 0;
        self.scroll = 0;
    }

    pub fn set_capacity(&mut self, capacity: usize, len: usize) {
        self.capacity = capacity.max(1);
        self.clamp(len);
    }

    /// Pull the selection back inside a list of `len` rows.
    pub fn clamp(&mut self, len: usize) {
        self.selected = self.selected.min(len.saturating_sub(1));
        self.scroll = self.scroll.min(self.selected);
        self.keep_visible();
    }

    /// Rows currently on screen.
    pub fn visible(&self, len: usize) -> Range<usize> {
        let start = self.scroll.min(len);
        start..(start + self.capacity).min(len)
    }

    fn keep_visible(&mut self) {
        if self.selected < self.scroll {
            self.scroll = self.selected;
        } else if self.selected >= self.scroll + self.capacity {
            self.scroll = self.selected + 1 - self.capacity;
        }
    }
}

/// Everything the browsing screen needs for one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryView {
    pub path: PathBuf,
    pub size_label: String,
    pub entries: Vec<Entry>,
}

pub struct Navigator {
    run: Run,
    root: PathBuf,
    current: PathBuf,
    listing: Listing,
    cursor: Cursor,
}

impl Navigator {
    /// Load the run's root listing and start browsing at the scan root.
    pub fn open(run: Run, page_capacity: usize) -> Result<Self, OpenRunError> {
        let listing = run.root_listing().ok_or_else(|| OpenRunError::MissingListing {
            run: run.id().label(),
        })?;
        if listing.is_empty() {
            return Err(OpenRunError::EmptyListing {
                run: run.id().label(),
            });
        }
        let root = run
            .root_path(&listing)
            .ok_or_else(|| OpenRunError::EmptyListing {
                run: run.id().label(),
            })?;
        debug!(run = %run.id(), root = %root.display(), "browsing run");

        let mut navigator = Self {
            run,
            current: root.clone(),
            root,
            listing,
            cursor: Cursor::new(page_capacity),
        };
        navigator.reset_cursor();
        Ok(navigator)
    }

    pub fn run(&self) -> &Run {
        &self.run
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn current(&self) -> &Path {
        &self.current
    }

    pub fn listing(&self) -> &Listing {
        &self.listing
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn at_root(&self) -> bool {
        paths::same_path(&self.current, &self.root)
    }

    /// Size of the current path, the parent row (unless at the root), then
    /// children largest first with ties by case-insensitive name.
    pub fn view(&self) -> DirectoryView {
        let size_label = self
            .listing
            .size_of(&self.current)
            .unwrap_or(UNKNOWN_SIZE)
            .to_string();

        let mut children: Vec<(f64, Entry)> = self
            .listing
            .children_of(&self.current)
            .map(|record| {
                let entry = Entry {
                    kind: EntryKind::Child,
                    name: paths::display_name(&record.path),
                    path: record.path.clone(),
                    size_label: record.size_label.clone(),
                };
                (size_unit::parse_or_zero(&record.size_label), entry)
            })
            .collect();
        children.sort_by(|(a_size, a), (b_size, b)| {
            b_size
                .total_cmp(a_size)
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        });

        let parent = if self.at_root() {
            None
        } else {
            paths::parent_of(&self.current).map(|path| Entry {
                kind: EntryKind::Parent,
                name: PARENT_LABEL.to_string(),
                path,
                size_label: String::new(),
            })
        };

        DirectoryView {
            path: self.current.clone(),
            size_label,
            entries: parent
                .into_iter()
                .chain(children.into_iter().map(|(_, entry)| entry))
                .collect(),
        }
    }

    pub fn entries(&self) -> Vec<Entry> {
        self.view().entries
    }

    pub fn move_up(&mut self) {
        self.cursor.up();
    }

    pub fn move_down(&mut self) {
        let len = self.entries().len();
        self.cursor.down(len);
    }

    pub fn set_page_capacity(&mut self, capacity: usize) {
        let len = self.entries().len();
        self.cursor.set_capacity(capacity, len);
    }

    /// Act on the highlighted row. Returns false when there is nothing to select.
    pub fn select(&mut self) -> bool {
        let entries = self.entries();
        let Some(entry) = entries.get(self.cursor.selected()) else {
            return false;
        };
        match entry.kind {
            EntryKind::Parent => self.ascend(entry.path.clone()),
            EntryKind::Child => self.descend(entry.path.clone()),
        }
        true
    }

    fn ascend(&mut self, parent: PathBuf) {
        debug!(path = %parent.display(), "going to parent directory");
        self.current = paths::normalize(&parent);
        let found = if self.at_root() {
            self.run.root_listing()
        } else {
            self.run.resolve_listing(&self.root, &self.current)
        };
        self.adopt(found);
        self.reset_cursor();
    }

    fn descend(&mut self, child: PathBuf) {
        debug!(path = %child.display(), "navigating into directory");
        self.current = paths::normalize(&child);
        let found = self.run.resolve_listing(&self.root, &self.current);
        self.adopt(found);
        self.reset_cursor();
    }

    /// Replace the active listing only with a non-empty one.
    fn adopt(&mut self, found: Option<Listing>) {
        match found {
            Some(listing) if !listing.is_empty() => {
                debug!(records = listing.len(), "switching listing");
                self.listing = listing;
            }
            _ => debug!(path = %self.current.display(), "no listing here, keeping current one"),
        }
    }

    fn reset_cursor(&mut self) {
        self.cursor.reset();
        let len = self.entries().len();
        self.cursor.clamp(len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{RunId, LISTING_FILE};
    use std::fs;

    fn write_listing(run: &Run, relative: &str, text: &str) {
        let dir = run.dir().join(relative);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(LISTING_FILE), text).unwrap();
    }

    fn home_run(tmp: &tempfile::TempDir) -> Run {
        let run = Run::create(tmp.path(), RunId::parse("2024-02-03_04-05-06").unwrap()).unwrap();
        write_listing(&run, "", "10G\t/home/u\n8G\t/home/u/video\n500M\t/home/u/docs\n");
        write_listing(
            &run,
            "video",
            "8G\t/home/u/video\n5G\t/home/u/video/raw\n5G\t/home/u/video/Archive\n1G\t/home/u/video/cuts\n",
        );
        run
    }

    fn names(view: &DirectoryView) -> Vec<&str> {
        view.entries.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn test_root_view_has_no_parent_row() {
        let tmp = tempfile::tempdir().unwrap();
        let nav = Navigator::open(home_run(&tmp), 10).unwrap();

        let view = nav.view();
        assert_eq!(view.path, PathBuf::from("/home/u"));
        assert_eq!(view.size_label, "10G");
        assert_eq!(names(&view), vec!["video", "docs"]);
        assert_eq!(view.entries[0].size_label, "8G");
        assert_eq!(view.entries[1].size_label, "500M");
    }

    #[test]
    fn test_descend_into_expanded_child_switches_listing() {
        let tmp = tempfile::tempdir().unwrap();
        let mut nav = Navigator::open(home_run(&tmp), 10).unwrap();

        assert!(nav.select());
        let view = nav.view();
        assert_eq!(view.path, PathBuf::from("/home/u/video"));
        assert_eq!(view.size_label, "8G");
        assert_eq!(names(&view), vec![PARENT_LABEL, "Archive", "raw", "cuts"]);
        assert_eq!(view.entries[0].path, PathBuf::from("/home/u"));
    }

    #[test]
    fn test_descend_into_leaf_keeps_listing() {
        let tmp = tempfile::tempdir().unwrap();
        let mut nav = Navigator::open(home_run(&tmp), 10).unwrap();
        let before = nav.listing().clone();

        nav.move_down();
        assert!(nav.select());

        assert_eq!(nav.current(), Path::new("/home/u/docs"));
        assert_eq!(nav.listing(), &before);
        let view = nav.view();
        assert_eq!(view.size_label, "500M");
        assert_eq!(names(&view), vec![PARENT_LABEL]);
    }

    #[test]
    fn test_unreadable_child_listing_keeps_listing() {
        let tmp = tempfile::tempdir().unwrap();
        let run = home_run(&tmp);
        // A directory where the listing file should be cannot be read.
        fs::remove_file(run.dir().join("video").join(LISTING_FILE)).unwrap();
        fs::create_dir(run.dir().join("video").join(LISTING_FILE)).unwrap();
        write_listing(&run, "docs", "garbage without tabs\n");

        let mut nav = Navigator::open(run, 10).unwrap();
        let before = nav.listing().clone();

        assert!(nav.select());
        assert_eq!(nav.current(), Path::new("/home/u/video"));
        assert_eq!(nav.listing(), &before);
        assert_eq!(names(&nav.view()), vec![PARENT_LABEL]);

        assert!(nav.select());
        assert!(nav.at_root());
        nav.move_down();
        assert!(nav.select());
        assert_eq!(nav.current(), Path::new("/home/u/docs"));
        assert_eq!(nav.listing(), &before);
        assert_eq!(nav.view().size_label, "500M");
    }

    #[test]
    fn test_leaf_without_record_shows_unknown_size() {
        let tmp = tempfile::tempdir().unwrap();
        let mut nav = Navigator::open(home_run(&tmp), 10).unwrap();

        nav.select();
        nav.move_down();
        nav.move_down();
        assert!(nav.select());
        assert_eq!(nav.current(), Path::new("/home/u/video/raw"));

        // Step into a grandchild the scan never listed.
        nav.descend(PathBuf::from("/home/u/video/raw/clip"));
        assert_eq!(nav.view().size_label, UNKNOWN_SIZE);
        assert_eq!(nav.view().entries.len(), 1);
    }

    #[test]
    fn test_child_then_parent_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let mut nav = Navigator::open(home_run(&tmp), 10).unwrap();

        nav.select();
        assert_eq!(nav.current(), Path::new("/home/u/video"));
        nav.select();
        assert_eq!(nav.current(), Path::new("/home/u"));
        assert!(nav.at_root());
        assert_eq!(names(&nav.view()), vec!["video", "docs"]);

        nav.move_down();
        nav.select();
        nav.select();
        assert_eq!(nav.current(), Path::new("/home/u"));
    }

    #[test]
    fn test_parent_without_listing_keeps_child_listing() {
        let tmp = tempfile::tempdir().unwrap();
        let run = Run::create(tmp.path(), RunId::parse("2024-02-03_04-05-06").unwrap()).unwrap();
        write_listing(&run, "", "10G\t/r\n9G\t/r/a\n");
        write_listing(&run, "a/b", "7G\t/r/a/b\n6G\t/r/a/b/c\n");

        let mut nav = Navigator::open(run, 10).unwrap();
        nav.descend(PathBuf::from("/r/a/b"));
        let deep = nav.listing().clone();
        assert_eq!(names(&nav.view()), vec![PARENT_LABEL, "c"]);

        assert!(nav.select());
        assert_eq!(nav.current(), Path::new("/r/a"));
        assert_eq!(nav.listing(), &deep);
        assert_eq!(names(&nav.view()), vec![PARENT_LABEL, "b"]);

        assert!(nav.select());
        assert!(nav.at_root());
        assert_eq!(names(&nav.view()), vec!["a"]);
    }

    #[test]
    fn test_selection_is_clamped_and_reset() {
        let tmp = tempfile::tempdir().unwrap();
        let mut nav = Navigator::open(home_run(&tmp), 2).unwrap();

        nav.move_up();
        assert_eq!(nav.cursor().selected(), 0);
        for _ in 0..5 {
            nav.move_down();
        }
        assert_eq!(nav.cursor().selected(), 1);

        nav.move_up();
        nav.select();
        assert_eq!(nav.cursor().selected(), 0);
        assert_eq!(nav.cursor().scroll(), 0);
    }

    #[test]
    fn test_open_rejects_missing_or_empty_root_listing() {
        let tmp = tempfile::tempdir().unwrap();
        let run = Run::create(tmp.path(), RunId::parse("2024-02-03_04-05-06").unwrap()).unwrap();
        assert!(matches!(
            Navigator::open(run.clone(), 5),
            Err(OpenRunError::MissingListing { .. })
        ));

        write_listing(&run, "", "not a listing\n");
        assert!(matches!(
            Navigator::open(run, 5),
            Err(OpenRunError::EmptyListing { .. })
        ));
    }

    #[test]
    fn test_cursor_keeps_selection_visible() {
        let mut cursor = Cursor::new(3);
        for _ in 0..7 {
            cursor.down(10);
        }
        assert_eq!(cursor.selected(), 7);
        assert_eq!(cursor.scroll(), 5);
        assert_eq!(cursor.visible(10), 5..8);

        cursor.set_capacity(1, 10);
        assert_eq!(cursor.scroll(), 7);

        cursor.set_capacity(4, 3);
        assert_eq!(cursor.selected(), 2);
        assert!(cursor.scroll() <= 2);

        for _ in 0..3 {
            cursor.up();
        }
        assert_eq!((cursor.selected(), cursor.scroll()), (0, 0));

        let mut empty = Cursor::new(0);
        empty.down(0);
        assert_eq!(empty.selected(), 0);
        assert_eq!(empty.capacity(), 1);
        assert_eq!(empty.visible(0), 0..0);
    }
}
