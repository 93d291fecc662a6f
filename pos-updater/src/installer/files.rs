//! Replacement of application files from the package's `files/` tree.

use crate::fs::copy::{copy_file, CopyError};
use crate::fs::filter::PathFilter;
use crate::fs::walker::{walk_directory, WalkOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Default)]
pub struct FileInstallStats {
    pub installed: usize,
    pub bytes: u64,
    /// Protected files present in the package but left untouched
    pub skipped: Vec<PathBuf>,
}

/// Copy every file under `files_dir` into `app_root`, replacing existing
/// files unconditionally. Files whose name matches `protected` are never
/// written. On failure, files already copied stay in place.
pub fn install_files(
    files_dir: &Path,
    app_root: &Path,
    protected: &PathFilter,
) -> Result<FileInstallStats, CopyError> {
    let files = walk_directory(files_dir, &WalkOptions::default()).map_err(|source| CopyError {
        path: files_dir.to_path_buf(),
        source,
    })?;

    let mut stats = FileInstallStats::default();
    for file in files {
        let name = file.relative_path.file_name().map(|n| n.to_string_lossy());
        if name.is_some_and(|n| protected.matches_name(&n)) {
            info!("Skipping {} (protected)", file.relative_path.display());
            stats.skipped.push(file.relative_path);
            continue;
        }

        stats.bytes += copy_file(&file.path, &app_root.join(&file.relative_path))?;
        stats.installed += 1;
        debug!("Updated {}", file.relative_path.display());
    }

    Ok(stats)
}
