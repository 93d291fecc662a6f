//! Pre-update snapshots of the application root.
//!
//! Snapshots live in `<root>/backups/backup_v<version>_<YYYYMMDD_HHMMSS>/`.
//! The installer only ever creates them; restoring is manual and pruning
//! is an explicit operator action.

use crate::fs::copy::{copy_tree, CopyError, CopyStats};
use crate::fs::filter::{PathFilter, BACKUPS_DIR};
use crate::fs::walker::WalkOptions;
use crate::version::SemanticVersion;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::info;

const BACKUP_PREFIX: &str = "backup_v";
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const TIMESTAMP_LEN: usize = 15;

/// A snapshot just written by [`create_backup`].
#[derive(Debug, Clone)]
pub struct BackupSnapshot {
    pub path: PathBuf,
    pub version: SemanticVersion,
    pub created_at: NaiveDateTime,
    pub stats: CopyStats,
}

/// A snapshot found on disk.
#[derive(Debug, Clone, Serialize)]
pub struct BackupEntry {
    pub name: String,
    pub path: PathBuf,
    pub version: Option<SemanticVersion>,
    pub created_at: Option<NaiveDateTime>,
}

pub fn backups_dir(app_root: &Path) -> PathBuf {
    app_root.join(BACKUPS_DIR)
}

/// Directory name for a snapshot of `version` taken at `timestamp`.
pub fn backup_name(version: &SemanticVersion, timestamp: &NaiveDateTime) -> String {
    format!("{BACKUP_PREFIX}{version}_{}", timestamp.format(TIMESTAMP_FORMAT))
}

/// Split a snapshot directory name into version and timestamp.
pub fn parse_backup_name(name: &str) -> Option<(SemanticVersion, NaiveDateTime)> {
    let rest = name.strip_prefix(BACKUP_PREFIX)?;
    let (version, stamp) = rest.split_once('_')?;
    let version = SemanticVersion::parse(version).ok()?;
    let stamp = stamp.get(..TIMESTAMP_LEN)?;
    let created_at = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;
    Some((version, created_at))
}

/// Create a fresh, uniquely named snapshot directory.
fn create_snapshot_dir(parent: &Path, name: &str) -> Result<PathBuf, CopyError> {
    let mut candidate = parent.join(name);
    let mut attempt = 1;
    loop {
        match fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            // two attempts within the same second
            Err(e) if e.kind() == ErrorKind::AlreadyExists && attempt < 100 => {
                candidate = parent.join(format!("{name}_{attempt}"));
                attempt += 1;
            }
            Err(source) => {
                return Err(CopyError {
                    path: candidate,
                    source,
                })
            }
        }
    }
}

/// Copy the application root into a new snapshot.
///
/// Version control, virtual environments, bytecode caches, earlier
/// snapshots and the scratch directory are left out. Database files are
/// included.
pub fn create_backup(app_root: &Path, version: &SemanticVersion) -> Result<BackupSnapshot, CopyError> {
    let parent = backups_dir(app_root);
    fs::create_dir_all(&parent).map_err(|source| CopyError {
        path: parent.clone(),
        source,
    })?;

    let created_at = chrono::Local::now().naive_local();
    let path = create_snapshot_dir(&parent, &backup_name(version, &created_at))?;
    info!("Creating backup in {}", path.display());

    let stats = copy_tree(app_root, &path, &WalkOptions::with_filter(PathFilter::backup()))?;
    info!("Backup complete: {} files, {} bytes", stats.files, stats.bytes);

    Ok(BackupSnapshot {
        path,
        version: *version,
        created_at,
        stats,
    })
}

/// Snapshots under `<root>/backups`, oldest first. Directories that do
/// not follow the naming scheme sort before the rest.
pub fn list_backups(app_root: &Path) -> std::io::Result<Vec<BackupEntry>> {
    let parent = backups_dir(app_root);
    if !parent.is_dir() {
        return Ok(Vec::new());
    }

    let mut entries: Vec<BackupEntry> = fs::read_dir(&parent)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|e| {
            let name = e.file_name().to_string_lossy().to_string();
            let parsed = parse_backup_name(&name);
            BackupEntry {
                path: e.path(),
                version: parsed.map(|(v, _)| v),
                created_at: parsed.map(|(_, t)| t),
                name,
            }
        })
        .collect();

    entries.sort_by(|a, b| (a.created_at, &a.name).cmp(&(b.created_at, &b.name)));
    Ok(entries)
}

/// Delete all but the `keep` newest snapshots. Returns the removed paths.
pub fn prune_backups(app_root: &Path, keep: usize) -> std::io::Result<Vec<PathBuf>> {
    let entries = list_backups(app_root)?;
    let excess = entries.len().saturating_sub(keep);

    let mut removed = Vec::with_capacity(excess);
    for old in entries.into_iter().take(excess) {
        fs::remove_dir_all(&old.path)?;
        info!("Removed old backup: {}", old.name);
        removed.push(old.path);
    }

    Ok(removed)
}
