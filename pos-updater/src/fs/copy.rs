//! Recursive tree copy.

use super::walker::{walk_directory_with_callback, WalkOptions};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
#[error("failed to copy {}: {source}", path.display())]
pub struct CopyError {
    /// The path being read or written when the copy failed
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Totals for a finished copy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub files: usize,
    pub bytes: u64,
}

/// Copy a single file, creating missing parent directories of `dst`.
/// An existing destination is overwritten.
pub fn copy_file(src: &Path, dst: &Path) -> Result<u64, CopyError> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).map_err(|source| CopyError {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    fs::copy(src, dst).map_err(|source| CopyError {
        path: src.to_path_buf(),
        source,
    })
}

/// Copy every file under `src` that `options` lets through into `dst`,
/// preserving relative paths. Stops at the first failure; files copied so
/// far stay in place.
pub fn copy_tree(src: &Path, dst: &Path, options: &WalkOptions) -> Result<CopyStats, CopyError> {
    fs::create_dir_all(dst).map_err(|source| CopyError {
        path: dst.to_path_buf(),
        source,
    })?;

    let mut stats = CopyStats::default();
    let mut failure = None;

    let walked = walk_directory_with_callback(src, options, |file| {
        match copy_file(&file.path, &dst.join(&file.relative_path)) {
            Ok(bytes) => {
                stats.files += 1;
                stats.bytes += bytes;
                Ok(())
            }
            Err(e) => {
                let io = std::io::Error::new(e.source.kind(), e.to_string());
                failure = Some(e);
                Err(io)
            }
        }
    });

    match (walked, failure) {
        (_, Some(e)) => Err(e),
        (Err(source), None) => Err(CopyError {
            path: src.to_path_buf(),
            source,
        }),
        (Ok(()), None) => Ok(stats),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::filter::PathFilter;
    use tempfile::TempDir;

    #[test]
    fn test_copy_tree() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();

        fs::write(src.path().join("file1.txt"), b"content1").unwrap();
        fs::create_dir(src.path().join("subdir")).unwrap();
        fs::write(src.path().join("subdir/file2.txt"), b"content2").unwrap();

        let target = dst.path().join("copy");
        let stats = copy_tree(src.path(), &target, &WalkOptions::default()).unwrap();

        assert_eq!(stats, CopyStats { files: 2, bytes: 16 });
        assert_eq!(fs::read(target.join("file1.txt")).unwrap(), b"content1");
        assert_eq!(fs::read(target.join("subdir/file2.txt")).unwrap(), b"content2");
    }

    #[test]
    fn test_copy_tree_applies_filter() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();

        fs::create_dir(src.path().join("__pycache__")).unwrap();
        fs::write(src.path().join("__pycache__/a.pyc"), b"x").unwrap();
        fs::write(src.path().join("a.py"), b"y").unwrap();

        let options = WalkOptions::with_filter(PathFilter::backup());
        let stats = copy_tree(src.path(), dst.path(), &options).unwrap();

        assert_eq!(stats.files, 1);
        assert!(!dst.path().join("__pycache__").exists());
    }

    #[test]
    fn test_copy_file_overwrites() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("new.txt");
        let dst = dir.path().join("deep/nested/old.txt");

        fs::write(&src, b"new").unwrap();
        fs::create_dir_all(dst.parent().unwrap()).unwrap();
        fs::write(&dst, b"old contents").unwrap();

        copy_file(&src, &dst).unwrap();
        assert_eq!(fs::read(&dst).unwrap(), b"new");
    }

    #[test]
    fn test_copy_tree_missing_source() {
        let dst = TempDir::new().unwrap();
        let err = copy_tree(Path::new("/definitely/not/here"), dst.path(), &WalkOptions::default())
            .unwrap_err();
        assert_eq!(err.path, Path::new("/definitely/not/here"));
    }
}
