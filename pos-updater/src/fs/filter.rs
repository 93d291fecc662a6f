//! Name-based exclusion rules for tree walks.
//!
//! Patterns are matched against a single path component and support `*`
//! wildcards (`*.pyc`, `test_*.png`). Rules are either applied at every
//! depth or only to entries directly under the walk root.

use std::path::{Path, PathBuf};

/// Version control, virtual environments and bytecode caches.
pub const DEVELOPMENT_ARTIFACTS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    ".venv",
    "venv",
    "__pycache__",
    "*.pyc",
    "*.pyo",
    "node_modules",
];

/// Directories owned by the updater inside the application root.
pub const BACKUPS_DIR: &str = "backups";
pub const SCRATCH_DIR: &str = "update_temp";

/// Live database file and its journals.
pub const DATABASE_FILES: &[&str] = &["*.db", "*.db-journal", "*.db-wal", "*.db-shm"];

#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    any_depth: Vec<String>,
    root_only: Vec<String>,
    exact: Vec<PathBuf>,
}

impl PathFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclude names matching any of `patterns` wherever they appear.
    pub fn exclude<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.any_depth.extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Exclude names matching `patterns` only directly under the root.
    pub fn exclude_at_root<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.root_only.extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Exclude one specific path, relative to the root.
    pub fn exclude_path(mut self, relative: impl Into<PathBuf>) -> Self {
        self.exact.push(relative.into());
        self
    }

    /// Filter used when snapshotting the application root.
    pub fn backup() -> Self {
        Self::new()
            .exclude(DEVELOPMENT_ARTIFACTS.iter().copied())
            .exclude_at_root([BACKUPS_DIR, SCRATCH_DIR])
    }

    /// Returns true if `name` matches one of the any-depth patterns.
    pub fn matches_name(&self, name: &str) -> bool {
        self.any_depth.iter().any(|p| glob_match(p, name))
    }

    /// Returns true if the entry at `relative` (relative to the walk root)
    /// must be skipped, together with everything below it.
    pub fn excludes(&self, relative: &Path) -> bool {
        if self.exact.iter().any(|p| p == relative) {
            return true;
        }

        let Some(name) = relative.file_name().map(|n| n.to_string_lossy()) else {
            return false;
        };

        if self.matches_name(&name) {
            return true;
        }

        relative.components().count() == 1 && self.root_only.iter().any(|p| glob_match(p, &name))
    }
}

/// Match `name` against a pattern where `*` stands for any run of characters.
pub fn glob_match(pattern: &str, name: &str) -> bool {
    let mut pieces = pattern.split('*');
    // split always yields at least one piece
    let first = pieces.next().unwrap_or_default();
    let Some(mut rest) = name.strip_prefix(first) else {
        return false;
    };

    let pieces: Vec<&str> = pieces.collect();
    let Some((last, middle)) = pieces.split_last() else {
        // no wildcard at all
        return rest.is_empty();
    };

    for piece in middle {
        match rest.find(piece) {
            Some(idx) => rest = &rest[idx + piece.len()..],
            None => return false,
        }
    }

    rest.ends_with(last)
}
