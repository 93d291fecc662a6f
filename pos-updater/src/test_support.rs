//! Fixtures shared by unit tests.

use crate::fs::checksum::tree_checksum;
use crate::package::{DEPENDENCIES_DIR, FILES_DIR, MANIFEST_FILE, PACKAGE_DIR};
use std::fs;
use std::path::{Path, PathBuf};

pub struct PackageSpec {
    pub version: String,
    pub platform: String,
    pub files: Vec<(String, Vec<u8>)>,
    pub artifacts: Vec<String>,
}

impl PackageSpec {
    pub fn new(version: &str) -> Self {
        Self {
            version: version.to_string(),
            platform: "win_amd64".to_string(),
            files: vec![
                ("pos_app.py".to_string(), b"print('new app')".to_vec()),
                ("ui/panel.py".to_string(), b"class Panel: pass".to_vec()),
            ],
            artifacts: Vec::new(),
        }
    }

    pub fn platform(mut self, platform: &str) -> Self {
        self.platform = platform.to_string();
        self
    }

    pub fn file(mut self, relative: &str, content: &[u8]) -> Self {
        self.files.push((relative.to_string(), content.to_vec()));
        self
    }

    pub fn artifact(mut self, name: &str) -> Self {
        self.artifacts.push(name.to_string());
        self
    }
}

/// Lay out `<volume>/pos_update` and return its path.
pub fn write_package(volume: &Path, spec: &PackageSpec) -> PathBuf {
    let package = volume.join(PACKAGE_DIR);
    let files = package.join(FILES_DIR);
    let deps = package.join(DEPENDENCIES_DIR);
    fs::create_dir_all(&files).unwrap();
    fs::create_dir_all(&deps).unwrap();

    for (relative, content) in &spec.files {
        let path = files.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
    for name in &spec.artifacts {
        fs::write(deps.join(name), b"artifact").unwrap();
    }

    let manifest = serde_json::json!({
        "version": spec.version,
        "release_date": "2024-06-01",
        "description": format!("Update to {}", spec.version),
        "requires_python": ">=3.10",
        "platform": spec.platform,
        "files_checksum": tree_checksum(&files).unwrap(),
        "dependencies": { "flask": "3.0.0" },
    });
    fs::write(package.join(MANIFEST_FILE), manifest.to_string()).unwrap();

    package
}

/// A live installation with a version marker and a database.
pub fn write_app_root(root: &Path, version: &str) {
    fs::create_dir_all(root.join("ui")).unwrap();
    fs::write(root.join("version.py"), format!("VERSION = \"{version}\"\n")).unwrap();
    fs::write(root.join("pos_app.py"), b"print('old app')").unwrap();
    fs::write(root.join("ui/panel.py"), b"class OldPanel: pass").unwrap();
    fs::write(root.join("pos_system.db"), b"live sales data").unwrap();
}
