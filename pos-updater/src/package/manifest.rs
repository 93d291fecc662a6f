//! The `update_info.json` manifest.

use crate::version::SemanticVersion;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Package folder at the root of an update volume.
pub const PACKAGE_DIR: &str = "pos_update";
/// Manifest file inside the package folder.
pub const MANIFEST_FILE: &str = "update_info.json";
/// Replacement file tree, mirroring the application root.
pub const FILES_DIR: &str = "files";
/// Pre-downloaded dependency artifacts.
pub const DEPENDENCIES_DIR: &str = "dependencies";

/// Descriptor for one candidate package.
///
/// `version`, `platform` and `files_checksum` are required; everything
/// else is informational.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateManifest {
    pub version: SemanticVersion,

    #[serde(default)]
    pub release_date: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// Minimum runtime requirement, not enforced
    #[serde(default, rename = "requires_python", alias = "requires_runtime")]
    pub requires_runtime: Option<String>,

    pub platform: String,

    /// Hex SHA-256 of the `files/` tree, see [`crate::fs::checksum`]
    pub files_checksum: String,

    /// Dependency name to pinned version, logged only
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,

    /// Absolute path of the package folder. Set by the validator,
    /// never written to the JSON file.
    #[serde(skip)]
    pub package_path: PathBuf,
}

impl UpdateManifest {
    /// Parse manifest JSON. `package_path` is left empty.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Pretty-printed JSON as written by the package builder.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn with_package_path(mut self, package_path: impl Into<PathBuf>) -> Self {
        self.package_path = package_path.into();
        self
    }

    pub fn files_dir(&self) -> PathBuf {
        self.package_path.join(FILES_DIR)
    }

    pub fn dependencies_dir(&self) -> PathBuf {
        self.package_path.join(DEPENDENCIES_DIR)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.package_path.join(MANIFEST_FILE)
    }
}

/// The package folder on a volume.
pub fn package_dir(volume_root: &Path) -> PathBuf {
    volume_root.join(PACKAGE_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"{
  "version": "1.0.8",
  "release_date": "2024-06-01",
  "description": "Actualización a versión 1.0.8",
  "requires_python": ">=3.10",
  "platform": "win_amd64",
  "files_checksum": "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08",
  "dependencies": { "flask": "3.0.0", "psutil": "5.9.8" }
}"#;

    #[test]
    fn test_parse_full_manifest() {
        let manifest = UpdateManifest::from_json(FULL).unwrap();

        assert_eq!(manifest.version, SemanticVersion::new(1, 0, 8));
        assert_eq!(manifest.platform, "win_amd64");
        assert_eq!(manifest.requires_runtime.as_deref(), Some(">=3.10"));
        assert_eq!(manifest.dependencies.get("psutil").map(String::as_str), Some("5.9.8"));
        assert_eq!(manifest.package_path, PathBuf::new());
    }

    #[test]
    fn test_parse_minimal_manifest() {
        let manifest = UpdateManifest::from_json(
            r#"{"version": "2.0.0", "platform": "linux_x86_64", "files_checksum": "abc"}"#,
        )
        .unwrap();

        assert!(manifest.dependencies.is_empty());
        assert!(manifest.description.is_none());
    }

    #[test]
    fn test_required_fields() {
        for missing in ["version", "platform", "files_checksum"] {
            let mut value: serde_json::Value = serde_json::from_str(FULL).unwrap();
            value.as_object_mut().unwrap().remove(missing);

            let err = UpdateManifest::from_json(&value.to_string()).unwrap_err();
            assert!(err.to_string().contains(missing), "{err}");
        }
    }

    #[test]
    fn test_invalid_version_is_rejected() {
        let text = FULL.replace("\"1.0.8\"", "\"1.0\"");
        assert!(UpdateManifest::from_json(&text).is_err());
    }

    #[test]
    fn test_serialized_form_keeps_schema() {
        let manifest = UpdateManifest::from_json(FULL)
            .unwrap()
            .with_package_path("/media/usb/pos_update");
        let json: serde_json::Value =
            serde_json::from_str(&manifest.to_json_pretty().unwrap()).unwrap();

        assert_eq!(json["version"], "1.0.8");
        assert_eq!(json["requires_python"], ">=3.10");
        assert!(json.get("package_path").is_none());
    }
}
