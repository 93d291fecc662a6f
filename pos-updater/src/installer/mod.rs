//! The update pipeline.
//!
//! [`Updater::perform_update`] runs five stages strictly in order:
//! eligibility check, backup, dependency installation, file installation
//! and cleanup. A failing stage aborts the rest and nothing is rolled back;
//! the backup taken in stage two is the recovery path. Only a cleanup
//! failure is tolerated.

pub mod backup;
pub mod dependencies;
pub mod error;
pub mod files;
pub mod state;

pub use backup::{BackupEntry, BackupSnapshot};
pub use dependencies::{CommandInstaller, DependencyError, DependencyInstaller, DependencyRequest};
pub use error::InstallError;
pub use state::{InstallStage, InstallationState};

use crate::config::Config;
use crate::fs::checksum::tree_checksum;
use crate::fs::filter::{PathFilter, DATABASE_FILES, SCRATCH_DIR};
use crate::package::UpdateManifest;
use crate::platform::OsFamily;
use crate::version::SemanticVersion;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Outcome of a successful update.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateReport {
    pub from_version: SemanticVersion,
    pub to_version: SemanticVersion,
    pub backup: PathBuf,
    pub dependencies_installed: usize,
    pub files_installed: usize,
    pub files_skipped: Vec<PathBuf>,
    /// Set when the scratch directory could not be removed
    pub cleanup_error: Option<String>,
}

pub struct Updater {
    app_root: PathBuf,
    current_version: SemanticVersion,
    os_family: OsFamily,
    dependency_installer: Box<dyn DependencyInstaller>,
    artifact_extensions: Vec<String>,
    protected_files: PathFilter,
    verify_checksum: bool,
    state: InstallationState,
}

impl Updater {
    /// An updater for the installation at `app_root`, currently running
    /// `current_version`, with pip as the dependency installer.
    pub fn new(app_root: impl Into<PathBuf>, current_version: SemanticVersion) -> Self {
        Self {
            app_root: app_root.into(),
            current_version,
            os_family: OsFamily::current(),
            dependency_installer: Box::new(CommandInstaller::pip("python")),
            artifact_extensions: vec!["whl".to_string()],
            protected_files: PathFilter::new().exclude(DATABASE_FILES.iter().copied()),
            verify_checksum: false,
            state: InstallationState::Idle,
        }
    }

    pub fn from_config(config: &Config, current_version: SemanticVersion) -> Self {
        let install = &config.install;
        let installer = CommandInstaller::new(install.program.clone(), install.args.clone())
            .with_timeout(install.timeout());

        Self::new(config.app.root.clone(), current_version)
            .with_dependency_installer(installer)
            .with_artifact_extensions(install.artifact_extensions.clone())
            .with_protected_files(install.protected_files.clone())
            .with_checksum_verification(install.verify_checksum)
    }

    pub fn with_os_family(mut self, os_family: OsFamily) -> Self {
        self.os_family = os_family;
        self
    }

    pub fn with_dependency_installer(mut self, installer: impl DependencyInstaller + 'static) -> Self {
        self.dependency_installer = Box::new(installer);
        self
    }

    pub fn with_artifact_extensions(mut self, extensions: Vec<String>) -> Self {
        self.artifact_extensions = extensions;
        self
    }

    pub fn with_protected_files(mut self, patterns: Vec<String>) -> Self {
        self.protected_files = PathFilter::new().exclude(patterns);
        self
    }

    pub fn with_checksum_verification(mut self, enabled: bool) -> Self {
        self.verify_checksum = enabled;
        self
    }

    pub fn app_root(&self) -> &Path {
        &self.app_root
    }

    pub fn current_version(&self) -> SemanticVersion {
        self.current_version
    }

    pub fn state(&self) -> InstallationState {
        self.state
    }

    fn scratch_dir(&self) -> PathBuf {
        self.app_root.join(SCRATCH_DIR)
    }

    /// Precondition gate run before anything is touched.
    pub fn check_eligibility(&self, manifest: &UpdateManifest) -> Result<(), InstallError> {
        if !manifest.version.is_newer_than(&self.current_version) {
            return Err(InstallError::VersionNotNewer {
                candidate: manifest.version,
                current: self.current_version,
            });
        }

        if !self.os_family.accepts(&manifest.platform) {
            return Err(InstallError::PlatformMismatch {
                platform: manifest.platform.clone(),
                expected: self.os_family.to_string(),
            });
        }

        if !manifest.package_path.exists() {
            return Err(InstallError::PackageMissing(manifest.package_path.clone()));
        }

        if self.verify_checksum {
            let files_dir = manifest.files_dir();
            let actual = tree_checksum(&files_dir)
                .map_err(|source| InstallError::ChecksumUnreadable { path: files_dir, source })?;
            if !actual.eq_ignore_ascii_case(manifest.files_checksum.trim()) {
                return Err(InstallError::ChecksumMismatch {
                    expected: manifest.files_checksum.clone(),
                    actual,
                });
            }
        }

        Ok(())
    }

    /// Host-facing form of [`Self::check_eligibility`]: `(true, "OK")` or
    /// `(false, reason)`.
    pub fn can_update(&self, manifest: &UpdateManifest) -> (bool, String) {
        match self.check_eligibility(manifest) {
            Ok(()) => (true, "OK".to_string()),
            Err(e) => (false, e.to_string()),
        }
    }

    /// Install `manifest`. Runs to completion once started; the caller
    /// decides when to restart.
    pub fn perform_update(&mut self, manifest: &UpdateManifest) -> Result<UpdateReport, InstallError> {
        info!(
            "Starting update {} -> {} from {}",
            self.current_version,
            manifest.version,
            manifest.package_path.display()
        );

        match self.run_stages(manifest) {
            Ok(report) => {
                self.state = InstallationState::Done;
                info!(
                    "Update complete: {} -> {} ({} files, {} dependencies)",
                    report.from_version, report.to_version, report.files_installed, report.dependencies_installed
                );
                self.current_version = manifest.version;
                Ok(report)
            }
            Err(e) => {
                self.state = InstallationState::Failed(e.stage());
                match e.backup_path() {
                    Some(backup) => error!(
                        "Update failed during {}: {}. Restore from {}",
                        e.stage(),
                        e,
                        backup.display()
                    ),
                    None => error!("Update failed during {}: {}", e.stage(), e),
                }
                Err(e)
            }
        }
    }

    fn enter(&mut self, stage: InstallStage) {
        self.state = InstallationState::Running(stage);
    }

    fn run_stages(&mut self, manifest: &UpdateManifest) -> Result<UpdateReport, InstallError> {
        self.enter(InstallStage::Validating);
        self.check_eligibility(manifest)?;

        self.enter(InstallStage::BackingUp);
        info!("[1/4] Creating backup...");
        let snapshot = backup::create_backup(&self.app_root, &self.current_version)
            .map_err(|e| InstallError::BackupFailed(e.to_string()))?;
        let backup = snapshot.path;

        self.enter(InstallStage::InstallingDependencies);
        info!("[2/4] Installing dependencies...");
        let dependencies_installed = self.install_dependencies(manifest, &backup)?;

        self.enter(InstallStage::InstallingFiles);
        info!("[3/4] Installing files...");
        let stats = files::install_files(&manifest.files_dir(), &self.app_root, &self.protected_files)
            .map_err(|e| InstallError::FileInstallFailed {
                detail: e.to_string(),
                backup: backup.clone(),
            })?;

        self.enter(InstallStage::CleaningUp);
        info!("[4/4] Cleaning up...");
        let cleanup_error = self.cleanup();

        Ok(UpdateReport {
            from_version: self.current_version,
            to_version: manifest.version,
            backup,
            dependencies_installed,
            files_installed: stats.installed,
            files_skipped: stats.skipped,
            cleanup_error,
        })
    }

    fn install_dependencies(&self, manifest: &UpdateManifest, backup: &Path) -> Result<usize, InstallError> {
        for (name, version) in &manifest.dependencies {
            info!("Package declares {}=={}", name, version);
        }

        let deps_dir = manifest.dependencies_dir();
        let artifacts = dependencies::find_artifacts(&deps_dir, &self.artifact_extensions).map_err(|e| {
            InstallError::DependencyInstallFailed {
                detail: format!("cannot list {}: {}", deps_dir.display(), e),
                backup: backup.to_path_buf(),
            }
        })?;

        if artifacts.is_empty() {
            info!("No dependency artifacts to install");
            return Ok(0);
        }

        let scratch_dir = self.scratch_dir();
        let request = DependencyRequest {
            deps_dir: &deps_dir,
            artifacts: &artifacts,
            scratch_dir: &scratch_dir,
        };

        self.dependency_installer.install(&request).map_err(|e| match e {
            DependencyError::Failed(detail) => InstallError::DependencyInstallFailed {
                detail,
                backup: backup.to_path_buf(),
            },
            DependencyError::Timeout(timeout) => InstallError::DependencyInstallTimeout {
                timeout_secs: timeout.as_secs(),
                backup: backup.to_path_buf(),
            },
        })?;

        Ok(artifacts.len())
    }

    /// Remove the scratch directory. Failure is reported, never fatal.
    fn cleanup(&self) -> Option<String> {
        let scratch_dir = self.scratch_dir();
        if !scratch_dir.exists() {
            return None;
        }

        match std::fs::remove_dir_all(&scratch_dir) {
            Ok(()) => None,
            Err(e) => {
                warn!("Could not remove {}: {}", scratch_dir.display(), e);
                Some(e.to_string())
            }
        }
    }
}
