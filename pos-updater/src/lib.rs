//! POS Updater Library
//!
//! Offline updates for a point-of-sale terminal, delivered on removable
//! media: volume monitoring, package validation, a backup-first install
//! pipeline and the loopback API the host application drives it through.

pub mod api;
pub mod config;
pub mod daemon;
pub mod fs;
pub mod installer;
pub mod monitor;
pub mod package;
pub mod platform;
pub mod restart;
pub mod utils;
pub mod version;
pub mod volumes;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use config::Config;
pub use installer::{InstallError, UpdateReport, Updater};
pub use package::UpdateManifest;
pub use utils::errors::{Result, UpdaterError};
pub use version::SemanticVersion;
