use std::path::Path;
use std::process::{Command, Stdio};

use tracing::warn;

#[cfg(target_os = "macos")]
const OPENER: &str = "open";
#[cfg(not(target_os = "macos"))]
const OPENER: &str = "xdg-open";

/// Show `path` in the desktop file manager. Best effort: any failure is
/// logged and reported as `false`.
pub fn open_in_file_manager(path: &Path) -> bool {
    let status = Command::new(OPENER)
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match status {
        Ok(status) if status.success() => true,
        Ok(status) => {
            warn!(path = %path.display(), %status, opener = OPENER, "file manager reported failure");
            false
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, opener = OPENER, "could not launch file manager");
            false
        }
    }
}
