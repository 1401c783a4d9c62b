//! Writes a generated bundle to disk.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::bundle::RescueBundle;
use crate::compose::host::HOST_SCRIPT_NAME;
use crate::compose::repair::SCRIPT_NAME;
use crate::error::RescueError;

/// Markdown instructions written next to the scripts.
pub const EXPLANATION_NAME: &str = "INSTRUCTIONS.md";

/// Paths `write_bundle` would create inside `dir`, in write order.
pub fn bundle_paths(dir: &Path) -> [PathBuf; 3] {
    [
        dir.join(HOST_SCRIPT_NAME),
        dir.join(SCRIPT_NAME),
        dir.join(EXPLANATION_NAME),
    ]
}

/// Creates `dir` if needed and writes the three artifacts into it.
/// Existing files are overwritten; asking first is the caller's job.
pub fn write_bundle(dir: &Path, bundle: &RescueBundle) -> Result<Vec<PathBuf>, RescueError> {
    fs::create_dir_all(dir)?;

    let [host, repair, explanation] = bundle_paths(dir);
    write_file(&host, &bundle.host_script, true)?;
    write_file(&repair, &bundle.repair_script, true)?;
    write_file(&explanation, &bundle.explanation, false)?;

    Ok(vec![host, repair, explanation])
}

fn write_file(path: &Path, content: &str, executable: bool) -> Result<(), RescueError> {
    fs::write(path, content)?;
    if executable {
        make_executable(path)?;
    }
    debug!(path = %path.display(), bytes = content.len(), "wrote artifact");
    Ok(())
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<(), RescueError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<(), RescueError> {
    Ok(())
}
