//! Installer failures. Every variant raised after the backup stage names
//! the backup so the operator has a recovery path.

use super::state::InstallStage;
use crate::version::SemanticVersion;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("version {candidate} is not newer than the running version {current}")]
    VersionNotNewer {
        candidate: SemanticVersion,
        current: SemanticVersion,
    },

    #[error("incompatible platform {platform:?}: this machine runs {expected}")]
    PlatformMismatch { platform: String, expected: String },

    #[error("update package path does not exist: {}", .0.display())]
    PackageMissing(PathBuf),

    #[error("files checksum mismatch: manifest says {expected}, package has {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("cannot read package files at {} for checksum: {source}", path.display())]
    ChecksumUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("backup failed, nothing was installed: {0}")]
    BackupFailed(String),

    #[error("dependency installation failed: {detail} (backup at {})", backup.display())]
    DependencyInstallFailed { detail: String, backup: PathBuf },

    #[error("dependency installation timed out after {timeout_secs}s (backup at {})", backup.display())]
    DependencyInstallTimeout { timeout_secs: u64, backup: PathBuf },

    #[error("file installation failed: {detail}; restore from backup at {}", backup.display())]
    FileInstallFailed { detail: String, backup: PathBuf },
}

impl InstallError {
    /// The stage that failed.
    pub fn stage(&self) -> InstallStage {
        match self {
            Self::VersionNotNewer { .. }
            | Self::PlatformMismatch { .. }
            | Self::PackageMissing(_)
            | Self::ChecksumMismatch { .. }
            | Self::ChecksumUnreadable { .. } => InstallStage::Validating,
            Self::BackupFailed(_) => InstallStage::BackingUp,
            Self::DependencyInstallFailed { .. } | Self::DependencyInstallTimeout { .. } => {
                InstallStage::InstallingDependencies
            }
            Self::FileInstallFailed { .. } => InstallStage::InstallingFiles,
        }
    }

    /// Backup taken before the failure, if the pipeline got that far.
    pub fn backup_path(&self) -> Option<&Path> {
        match self {
            Self::DependencyInstallFailed { backup, .. }
            | Self::DependencyInstallTimeout { backup, .. }
            | Self::FileInstallFailed { backup, .. } => Some(backup),
            _ => None,
        }
    }
}
