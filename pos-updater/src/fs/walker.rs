//! Directory traversal for backups, package installs and package builds.

use super::filter::PathFilter;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Options for directory walking
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Follow symbolic links
    pub follow_links: bool,

    /// Visit a directory's files (by name) before its subdirectories (by name).
    /// Gives a stable order for checksums.
    pub sorted: bool,

    /// Entries to skip, together with everything below them
    pub filter: PathFilter,
}

impl WalkOptions {
    pub fn with_filter(filter: PathFilter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }
}

/// A regular file discovered during walking
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Full path to the file
    pub path: PathBuf,

    /// Relative path from the root
    pub relative_path: PathBuf,

    /// File size in bytes
    pub size: u64,
}

impl FileInfo {
    /// Create FileInfo from a DirEntry.
    /// Symlinks are resolved to their target; links to directories and
    /// broken links yield None.
    fn from_entry(entry: &DirEntry, root: &Path) -> std::io::Result<Option<Self>> {
        let file_type = entry.file_type();
        if file_type.is_dir() {
            return Ok(None);
        }

        let path = entry.path().to_path_buf();
        let relative_path = path.strip_prefix(root).unwrap_or(&path).to_path_buf();

        let size = if file_type.is_symlink() {
            match std::fs::metadata(&path) {
                Ok(resolved) if resolved.is_file() => resolved.len(),
                _ => return Ok(None),
            }
        } else {
            entry.metadata()?.len()
        };

        Ok(Some(Self {
            path,
            relative_path,
            size,
        }))
    }
}

fn files_first(a: &DirEntry, b: &DirEntry) -> Ordering {
    (a.file_type().is_dir(), a.file_name()).cmp(&(b.file_type().is_dir(), b.file_name()))
}

/// Walk a directory tree with a callback for each file.
///
/// Excluded directories are pruned, not descended into. The callback may
/// abort the walk by returning an error.
pub fn walk_directory_with_callback<F>(
    root: &Path,
    options: &WalkOptions,
    mut callback: F,
) -> std::io::Result<()>
where
    F: FnMut(&FileInfo) -> std::io::Result<()>,
{
    let mut walker = WalkDir::new(root).follow_links(options.follow_links);
    if options.sorted {
        walker = walker.sort_by(files_first);
    }

    let entries = walker.into_iter().filter_entry(|entry| {
        entry.depth() == 0 || {
            let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
            !options.filter.excludes(relative)
        }
    });

    for entry in entries {
        let entry = entry?;
        if let Some(file_info) = FileInfo::from_entry(&entry, root)? {
            callback(&file_info)?;
        }
    }

    Ok(())
}

/// Walk a directory tree and collect all files
pub fn walk_directory(root: &Path, options: &WalkOptions) -> std::io::Result<Vec<FileInfo>> {
    let mut files = Vec::new();
    walk_directory_with_callback(root, options, |file| {
        files.push(file.clone());
        Ok(())
    })?;
    Ok(files)
}
