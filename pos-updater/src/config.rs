//! Configuration management for the update daemon.
//!
//! Loads configuration from a TOML file; every section and key is optional
//! and falls back to the defaults below. CLI flags are applied on top by
//! the binary.

use crate::installer::dependencies::DEFAULT_INSTALL_TIMEOUT;
use crate::utils::errors::{Result, UpdaterError};
use crate::version::marker::read_marker;
use crate::version::SemanticVersion;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub app: AppConfig,
    pub monitor: MonitorConfig,
    pub install: InstallConfig,
    pub api: ApiConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Terminal identifier reported by the API
    pub id: String,

    /// Application root that updates are installed into
    pub root: PathBuf,

    /// Running version; read from `version_file` when unset
    pub version: Option<String>,

    /// Version marker, relative to `root`
    pub version_file: PathBuf,

    /// Entry point relaunched after an update, relative to `root`
    pub entry_point: PathBuf,

    /// Interpreter that runs the entry point
    pub interpreter: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub enabled: bool,

    /// Seconds between volume scans
    pub check_interval_secs: f64,

    /// Seconds to wait for the scan loop on stop
    pub stop_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallConfig {
    /// Dependency installer program
    pub program: String,

    /// Installer arguments; `{deps_dir}` is substituted and artifact paths
    /// are appended
    pub args: Vec<String>,

    /// Extensions of installable artifacts in `dependencies/`
    pub artifact_extensions: Vec<String>,

    pub timeout_secs: u64,

    /// File name patterns never overwritten by an update
    pub protected_files: Vec<String>,

    /// Refuse packages whose `files/` tree does not match the manifest
    pub verify_checksum: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            id: hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "pos-terminal".to_string()),
            root: PathBuf::from("."),
            version: None,
            version_file: PathBuf::from("version.py"),
            entry_point: PathBuf::from("pos_app.py"),
            interpreter: "python".to_string(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_secs: 2.0,
            stop_timeout_secs: 5,
        }
    }
}

impl Default for InstallConfig {
    fn default() -> Self {
        let args = ["-m", "pip", "install", "--force-reinstall", "--no-index", "--find-links", "{deps_dir}"];
        Self {
            program: "python".to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            artifact_extensions: vec!["whl".to_string()],
            timeout_secs: DEFAULT_INSTALL_TIMEOUT.as_secs(),
            protected_files: crate::fs::filter::DATABASE_FILES.iter().map(|p| p.to_string()).collect(),
            verify_checksum: false,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 9991,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Running version: the explicit `[app] version` if set, otherwise the
    /// version marker under the application root.
    pub fn current_version(&self) -> Result<SemanticVersion> {
        match &self.app.version {
            Some(text) => Ok(SemanticVersion::parse(text)?),
            None => Ok(read_marker(&self.version_file())?),
        }
    }

    pub fn version_file(&self) -> PathBuf {
        self.app.root.join(&self.app.version_file)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.monitor.check_interval_secs.is_finite() || self.monitor.check_interval_secs <= 0.0 {
            return Err(UpdaterError::Config(format!(
                "monitor.check_interval_secs must be positive, got {}",
                self.monitor.check_interval_secs
            )));
        }
        if self.install.program.trim().is_empty() {
            return Err(UpdaterError::Config("install.program must not be empty".to_string()));
        }
        Ok(())
    }
}

impl MonitorConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs_f64(self.check_interval_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

impl InstallConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
