//! Lexical path handling shared by the scanner and the browser.
//!
//! Listing files carry absolute paths exactly as the measurer printed them,
//! so both sides compare and map paths without touching the filesystem.

use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Resolve `.` and `..` components syntactically, without following links.
pub fn normalize(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(..) | Component::RootDir | Component::Normal(_) => {
                components.push(component);
            }
            Component::CurDir => {}
            Component::ParentDir => match components.last() {
                Some(Component::Normal(_)) => {
                    components.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(..)) => {}
                _ => components.push(component),
            },
        }
    }
    if components.is_empty() {
        return PathBuf::from(".");
    }
    components.into_iter().collect()
}

/// Make `path` absolute against the working directory and normalize it.
///
/// Symlinks are kept as written so recorded paths match what the user asked for.
pub fn absolute(path: &Path) -> Result<PathBuf> {
    let absolute = std::path::absolute(path).map_err(|err| Error::io(path, err))?;
    Ok(normalize(&absolute))
}

/// The user's home directory, normalized. Falls back to the password
/// database when `HOME` is unset.
pub fn home_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| normalize(&home))
}

/// Compare two paths after normalization.
pub fn same_path(a: &Path, b: &Path) -> bool {
    normalize(a) == normalize(b)
}

/// Position of `path` below `root`; empty when they are the same directory.
pub fn relative_to(root: &Path, path: &Path) -> Result<PathBuf> {
    let root = normalize(root);
    let path = normalize(path);
    path.strip_prefix(&root)
        .map(Path::to_path_buf)
        .map_err(|_| Error::OutsideRoot { path, root })
}

/// Normalized parent directory, if there is one.
pub fn parent_of(path: &Path) -> Option<PathBuf> {
    normalize(path).parent().map(Path::to_path_buf)
}

/// Last path component for display; the whole path for `/`.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
