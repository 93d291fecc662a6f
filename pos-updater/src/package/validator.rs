//! Update package detection on a mounted volume.
//!
//! Most volumes are not update media, so [`inspect`] answers with an
//! `Option` and only logs malformed packages. [`load_package`] returns the
//! reason instead, for callers that were pointed at a package explicitly.

use super::manifest::{package_dir, UpdateManifest, DEPENDENCIES_DIR, FILES_DIR, MANIFEST_FILE};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum PackageError {
    #[error("no update package at {}", .0.display())]
    NotPresent(PathBuf),

    #[error("update_info.json missing in {}", .0.display())]
    MissingManifest(PathBuf),

    #[error("cannot read {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid {}: {source}", path.display())]
    InvalidManifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("'files' folder missing in {}", .0.display())]
    MissingFilesDir(PathBuf),

    #[error("'dependencies' folder missing in {}", .0.display())]
    MissingDependenciesDir(PathBuf),
}

/// Validate the package folder itself (`<volume>/pos_update`).
pub fn load_package_dir(package_path: &Path) -> Result<UpdateManifest, PackageError> {
    if !package_path.is_dir() {
        return Err(PackageError::NotPresent(package_path.to_path_buf()));
    }

    let manifest_path = package_path.join(MANIFEST_FILE);
    if !manifest_path.is_file() {
        return Err(PackageError::MissingManifest(package_path.to_path_buf()));
    }

    let text = std::fs::read_to_string(&manifest_path).map_err(|source| PackageError::Unreadable {
        path: manifest_path.clone(),
        source,
    })?;

    let manifest = UpdateManifest::from_json(&text).map_err(|source| PackageError::InvalidManifest {
        path: manifest_path.clone(),
        source,
    })?;

    if !package_path.join(FILES_DIR).is_dir() {
        return Err(PackageError::MissingFilesDir(package_path.to_path_buf()));
    }

    if !package_path.join(DEPENDENCIES_DIR).is_dir() {
        return Err(PackageError::MissingDependenciesDir(package_path.to_path_buf()));
    }

    let absolute = std::path::absolute(package_path).unwrap_or_else(|_| package_path.to_path_buf());
    Ok(manifest.with_package_path(absolute))
}

/// Validate the package on a volume, reporting why it is not usable.
pub fn load_package(volume_root: &Path) -> Result<UpdateManifest, PackageError> {
    load_package_dir(&package_dir(volume_root))
}

/// Validate an operator-supplied path, which may be either a volume root
/// or the package folder itself.
pub fn load_from_path(path: &Path) -> Result<UpdateManifest, PackageError> {
    if package_dir(path).is_dir() {
        load_package(path)
    } else {
        load_package_dir(path)
    }
}

/// Look for a well-formed package on a volume.
///
/// Side-effect free apart from logging; a volume without a package folder
/// is not worth a log line.
pub fn inspect(volume_root: &Path) -> Option<UpdateManifest> {
    match load_package(volume_root) {
        Ok(manifest) => {
            info!(
                "Valid update package on {}: version {} ({})",
                volume_root.display(),
                manifest.version,
                manifest.description.as_deref().unwrap_or("N/A")
            );
            Some(manifest)
        }
        Err(PackageError::NotPresent(_)) => None,
        Err(e) => {
            warn!("Ignoring malformed update package on {}: {}", volume_root.display(), e);
            None
        }
    }
}
