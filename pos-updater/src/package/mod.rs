//! Update package layout, manifest schema and validation.

pub mod manifest;
pub mod validator;

pub use manifest::{package_dir, UpdateManifest, DEPENDENCIES_DIR, FILES_DIR, MANIFEST_FILE, PACKAGE_DIR};
pub use validator::{inspect, load_package, load_from_path, load_package_dir, PackageError};
