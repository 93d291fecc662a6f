//! Construction of an update package on a target volume.
//!
//! Layout, exclusion rules, version marker and checksum all come from
//! `pos_updater`, so a package built here is validated by the terminal
//! with exactly the same rules.

use crate::config::BuilderConfig;
use crate::deps::{fetch_dependencies, parse_requirements, FetchOutcome};
use crate::error::BuildError;
use chrono::Local;
use pos_updater::fs::checksum::tree_checksum;
use pos_updater::fs::copy::{copy_file, copy_tree};
use pos_updater::fs::filter::{PathFilter, BACKUPS_DIR, DATABASE_FILES, DEVELOPMENT_ARTIFACTS, SCRATCH_DIR};
use pos_updater::fs::WalkOptions;
use pos_updater::package::{package_dir, UpdateManifest, DEPENDENCIES_DIR, FILES_DIR, MANIFEST_FILE};
use pos_updater::version::marker::{read_marker, write_marker};
use pos_updater::version::SemanticVersion;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Scratch output and local files that never ship.
const SCRATCH_FILES: &[&str] = &[
    "temp_barcode_*.png",
    "test_*.png",
    "test_*.py",
    ".gemini",
    ".gitignore",
    ".env",
];

#[derive(Debug, Clone)]
pub struct BuildSummary {
    pub package_dir: PathBuf,
    pub previous_version: SemanticVersion,
    pub version: SemanticVersion,
    pub files: usize,
    pub dependencies: BTreeMap<String, String>,
    pub fetch: FetchOutcome,
    pub checksum: String,
}

/// `E`, `e:` and `E:\` all name the drive root `E:\`. Anything else is
/// taken as a path.
pub fn normalize_target(raw: &str) -> PathBuf {
    let trimmed = raw.trim_end_matches(['\\', '/']);
    let letter = trimmed.strip_suffix(':').unwrap_or(trimmed);
    let mut chars = letter.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphabetic() => PathBuf::from(format!("{}:\\", c.to_ascii_uppercase())),
        _ => PathBuf::from(raw),
    }
}

/// The version to build: the requested one if it is strictly newer than
/// `current`, or `current` with its patch component incremented.
pub fn resolve_version(current: SemanticVersion, requested: Option<&str>) -> Result<SemanticVersion, BuildError> {
    let Some(requested) = requested else {
        return current.increment_patch().ok_or(BuildError::VersionOverflow(current));
    };

    let candidate = SemanticVersion::parse(requested)?;
    if !candidate.is_newer_than(&current) {
        return Err(BuildError::VersionNotNewer { candidate, current });
    }
    Ok(candidate)
}

/// Relative form of `path` if it lies inside `root`.
fn relative_to(path: &Path, root: &Path) -> Option<PathBuf> {
    let path = path.canonicalize().ok()?;
    let root = root.canonicalize().ok()?;
    path.strip_prefix(&root).ok().map(Path::to_path_buf)
}

pub struct PackageBuilder {
    config: BuilderConfig,
    self_exe: Option<PathBuf>,
}

impl PackageBuilder {
    pub fn new(config: BuilderConfig) -> Self {
        Self {
            config,
            self_exe: std::env::current_exe().ok(),
        }
    }

    /// Override the executable excluded from the copied tree.
    pub fn with_self_exe(mut self, exe: Option<PathBuf>) -> Self {
        self.self_exe = exe;
        self
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    pub fn current_version(&self) -> Result<SemanticVersion, BuildError> {
        Ok(read_marker(&self.config.version_path())?)
    }

    /// Exclusions for copying the project into `files/`.
    fn filter(&self, package: &Path) -> PathFilter {
        let root = &self.config.project_root;
        let mut filter = PathFilter::new()
            .exclude(DEVELOPMENT_ARTIFACTS.iter().copied())
            .exclude(DATABASE_FILES.iter().copied())
            .exclude(SCRATCH_FILES.iter().copied())
            .exclude_at_root([BACKUPS_DIR, SCRATCH_DIR]);

        let own = self.self_exe.iter().map(PathBuf::as_path).chain([package]);
        for path in own {
            if let Some(relative) = relative_to(path, root) {
                info!("Excluding {} from the package", relative.display());
                filter = filter.exclude_path(relative);
            }
        }
        filter
    }

    /// Build a package for `version` on the volume at `target`.
    pub fn build(&self, target: &Path, requested: Option<&str>) -> Result<BuildSummary, BuildError> {
        let project_root = &self.config.project_root;
        if !project_root.is_dir() {
            return Err(BuildError::ProjectNotFound(project_root.clone()));
        }

        let previous_version = self.current_version()?;
        let version = resolve_version(previous_version, requested)?;
        info!("Building update {} -> {}", previous_version, version);

        if !target.is_dir() {
            return Err(BuildError::TargetNotFound(target.to_path_buf()));
        }

        // Layout
        let package = package_dir(target);
        let files_dir = package.join(FILES_DIR);
        let deps_dir = package.join(DEPENDENCIES_DIR);
        if package.exists() {
            info!("Removing existing {}", package.display());
            fs::remove_dir_all(&package).map_err(|e| BuildError::io(&package, e))?;
        }
        for dir in [&files_dir, &deps_dir] {
            fs::create_dir_all(dir).map_err(|e| BuildError::io(dir, e))?;
        }

        // Project files
        info!("Copying project files from {}", project_root.display());
        let options = WalkOptions::with_filter(self.filter(&package));
        let stats = copy_tree(project_root, &files_dir, &options)?;
        info!("Copied {} files ({} bytes)", stats.files, stats.bytes);

        // Version marker
        let packaged_marker = files_dir.join(&self.config.version_file);
        if packaged_marker.is_file() {
            write_marker(&packaged_marker, &version)?;
            info!("Set {} to {}", self.config.version_file.display(), version);
        } else {
            warn!("{} not found in the packaged files", self.config.version_file.display());
        }

        // Dependencies
        let requirements = self.config.requirements_path();
        let dependencies = match fs::read_to_string(&requirements) {
            Ok(content) => {
                copy_file(&requirements, &deps_dir.join("requirements.txt"))?;
                parse_requirements(&content)
            }
            Err(_) => BTreeMap::new(),
        };
        info!("Fetching dependencies (this can take several minutes)");
        let fetch = fetch_dependencies(&self.config.fetch, &requirements, &deps_dir);
        match &fetch {
            FetchOutcome::NoRequirements => warn!("{} not found, no dependencies staged", requirements.display()),
            FetchOutcome::Fetched { artifacts } => info!("Staged {} dependency artifacts", artifacts),
            FetchOutcome::Failed { detail } => warn!("Some dependencies could not be fetched: {}", detail),
            FetchOutcome::TimedOut { after } => warn!("Dependency fetch timed out after {:?}", after),
        }

        // Manifest
        let checksum = tree_checksum(&files_dir).map_err(|e| BuildError::io(&files_dir, e))?;
        let manifest = UpdateManifest {
            version,
            release_date: Some(Local::now().format("%Y-%m-%d").to_string()),
            description: Some(format!("Update to version {version}")),
            requires_runtime: self.config.requires_runtime.clone(),
            platform: self.config.platform.clone(),
            files_checksum: checksum.clone(),
            dependencies: dependencies.clone(),
            package_path: package.clone(),
        };
        let manifest_path = package.join(MANIFEST_FILE);
        fs::write(&manifest_path, manifest.to_json_pretty()?).map_err(|e| BuildError::io(&manifest_path, e))?;
        info!("Wrote {}", manifest_path.display());

        Ok(BuildSummary {
            package_dir: package,
            previous_version,
            version,
            files: stats.files,
            dependencies,
            fetch,
            checksum,
        })
    }

    /// Point the development tree's own version marker at `version`.
    pub fn bump_local(&self, version: &SemanticVersion) -> Result<(), BuildError> {
        write_marker(&self.config.version_path(), version)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FetchConfig;
    use pos_updater::package::load_package;
    use std::time::Duration;
    use tempfile::TempDir;

    fn project(root: &Path) {
        fs::create_dir_all(root.join("ui/__pycache__")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::create_dir_all(root.join("backups/backup_v1.0.6_20240101_000000")).unwrap();
        fs::create_dir_all(root.join("update_temp")).unwrap();
        fs::write(root.join("version.py"), "# app version\nVERSION = \"1.0.7\"\n").unwrap();
        fs::write(root.join("pos_app.py"), "print('pos')").unwrap();
        fs::write(root.join("ui/panel.py"), "class Panel: pass").unwrap();
        fs::write(root.join("ui/__pycache__/panel.cpython-312.pyc"), "bytecode").unwrap();
        fs::write(root.join(".git/HEAD"), "ref").unwrap();
        fs::write(root.join("backups/backup_v1.0.6_20240101_000000/pos_app.py"), "old").unwrap();
        fs::write(root.join("pos_system.db"), "sales").unwrap();
        fs::write(root.join("test_printer.py"), "assert True").unwrap();
        fs::write(root.join("temp_barcode_001.png"), "png").unwrap();
        fs::write(root.join("requirements.txt"), "flask==3.0.0\nreportlab==4.1.0\n").unwrap();
    }

    fn config(root: &Path) -> BuilderConfig {
        let mut config = BuilderConfig::from_lookup(|_| None);
        config.project_root = root.to_path_buf();
        config.platform = "win_amd64".into();
        config.fetch = FetchConfig {
            program: "definitely-not-a-real-program-7f3a".into(),
            args: Vec::new(),
            timeout: Duration::from_secs(1),
        };
        config
    }

    #[test]
    fn test_normalize_target() {
        assert_eq!(normalize_target("E"), PathBuf::from("E:\\"));
        assert_eq!(normalize_target("e:"), PathBuf::from("E:\\"));
        assert_eq!(normalize_target("E:\\"), PathBuf::from("E:\\"));
        assert_eq!(normalize_target("/media/usb"), PathBuf::from("/media/usb"));
        assert_eq!(normalize_target("usb"), PathBuf::from("usb"));
    }

    #[test]
    fn test_resolve_version() {
        let current = SemanticVersion::new(1, 0, 7);
        assert_eq!(resolve_version(current, None).unwrap(), SemanticVersion::new(1, 0, 8));
        assert_eq!(resolve_version(current, Some("1.1.0")).unwrap(), SemanticVersion::new(1, 1, 0));
        assert!(matches!(
            resolve_version(current, Some("1.0.7")),
            Err(BuildError::VersionNotNewer { .. })
        ));
        assert!(matches!(resolve_version(current, Some("1.1")), Err(BuildError::InvalidVersion(_))));
    }

    #[test]
    fn test_resolve_version_patch_overflow() {
        let current = SemanticVersion::new(1, 0, u64::MAX);
        assert!(matches!(
            resolve_version(current, None),
            Err(BuildError::VersionOverflow(v)) if v == current
        ));
        // An explicit version still works past a saturated patch.
        assert_eq!(resolve_version(current, Some("1.1.0")).unwrap(), SemanticVersion::new(1, 1, 0));
    }

    #[test]
    fn test_build_package_is_accepted_by_validator() {
        let root = TempDir::new().unwrap();
        let usb = TempDir::new().unwrap();
        project(root.path());

        let builder = PackageBuilder::new(config(root.path())).with_self_exe(None);
        let summary = builder.build(usb.path(), None).unwrap();

        assert_eq!(summary.version, SemanticVersion::new(1, 0, 8));
        assert!(matches!(summary.fetch, FetchOutcome::Failed { .. }));
        assert_eq!(summary.dependencies.len(), 2);

        let manifest = load_package(usb.path()).unwrap();
        assert_eq!(manifest.version, summary.version);
        assert_eq!(manifest.platform, "win_amd64");
        assert_eq!(manifest.files_checksum, summary.checksum);
        assert_eq!(manifest.dependencies["flask"], "3.0.0");
        assert_eq!(tree_checksum(&manifest.files_dir()).unwrap(), summary.checksum);
        assert!(manifest.dependencies_dir().join("requirements.txt").is_file());

        let files = manifest.files_dir();
        assert!(files.join("pos_app.py").is_file());
        assert!(files.join("ui/panel.py").is_file());
        for excluded in [
            ".git",
            "backups",
            "update_temp",
            "ui/__pycache__",
            "pos_system.db",
            "test_printer.py",
            "temp_barcode_001.png",
        ] {
            assert!(!files.join(excluded).exists(), "{excluded} was packaged");
        }

        // packaged marker bumped, local marker untouched
        assert_eq!(read_marker(&files.join("version.py")).unwrap(), SemanticVersion::new(1, 0, 8));
        assert_eq!(builder.current_version().unwrap(), SemanticVersion::new(1, 0, 7));
        assert!(fs::read_to_string(files.join("version.py")).unwrap().starts_with("# app version"));
    }

    #[test]
    fn test_rebuild_clears_previous_package() {
        let root = TempDir::new().unwrap();
        let usb = TempDir::new().unwrap();
        project(root.path());
        fs::create_dir_all(usb.path().join("pos_update/files")).unwrap();
        fs::write(usb.path().join("pos_update/files/stale.py"), "stale").unwrap();

        let builder = PackageBuilder::new(config(root.path())).with_self_exe(None);
        builder.build(usb.path(), Some("2.0.0")).unwrap();

        assert!(!usb.path().join("pos_update/files/stale.py").exists());
        assert_eq!(load_package(usb.path()).unwrap().version, SemanticVersion::new(2, 0, 0));
    }

    #[test]
    fn test_builder_excludes_itself_and_nested_target() {
        let root = TempDir::new().unwrap();
        project(root.path());
        fs::create_dir_all(root.path().join("tools")).unwrap();
        fs::write(root.path().join("tools/pos-update-builder"), "binary").unwrap();
        let target = root.path().join("usb");
        fs::create_dir_all(&target).unwrap();

        let builder = PackageBuilder::new(config(root.path()))
            .with_self_exe(Some(root.path().join("tools/pos-update-builder")));
        let summary = builder.build(&target, None).unwrap();

        let files = summary.package_dir.join("files");
        assert!(!files.join("tools/pos-update-builder").exists());
        assert!(!files.join("usb/pos_update").exists());
    }

    #[test]
    fn test_rejected_version_touches_nothing() {
        let root = TempDir::new().unwrap();
        let usb = TempDir::new().unwrap();
        project(root.path());

        let builder = PackageBuilder::new(config(root.path())).with_self_exe(None);
        assert!(matches!(
            builder.build(usb.path(), Some("1.0.6")),
            Err(BuildError::VersionNotNewer { .. })
        ));
        assert!(!usb.path().join("pos_update").exists());
    }

    #[test]
    fn test_missing_target() {
        let root = TempDir::new().unwrap();
        project(root.path());

        let builder = PackageBuilder::new(config(root.path())).with_self_exe(None);
        assert!(matches!(
            builder.build(&root.path().join("no-such-volume"), None),
            Err(BuildError::TargetNotFound(_))
        ));
    }

    #[test]
    fn test_bump_local() {
        let root = TempDir::new().unwrap();
        project(root.path());

        let builder = PackageBuilder::new(config(root.path())).with_self_exe(None);
        builder.bump_local(&SemanticVersion::new(1, 0, 8)).unwrap();
        assert_eq!(builder.current_version().unwrap(), SemanticVersion::new(1, 0, 8));
    }
}
