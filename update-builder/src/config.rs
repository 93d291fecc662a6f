use pos_updater::platform::host_platform_tag;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BuilderConfig {
    pub project_root: PathBuf,
    /// Version marker, relative to the project root
    pub version_file: PathBuf,
    /// Pinned dependency list, relative to the project root
    pub requirements_file: PathBuf,
    pub platform: String,
    pub requires_runtime: Option<String>,
    pub fetch: FetchConfig,
}

/// Command that downloads dependency artifacts.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub program: String,
    /// `{requirements}` and `{deps_dir}` are substituted
    pub args: Vec<String>,
    pub timeout: Duration,
}

const DEFAULT_FETCH_ARGS: &str = "-m pip download -r {requirements} -d {deps_dir}";
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 600;

impl BuilderConfig {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let fetch_args = var("POS_FETCH_ARGS").unwrap_or_else(|| DEFAULT_FETCH_ARGS.into());

        Self {
            project_root: PathBuf::from(var("POS_PROJECT_ROOT").unwrap_or_else(|| ".".into())),
            version_file: PathBuf::from(var("POS_VERSION_FILE").unwrap_or_else(|| "version.py".into())),
            requirements_file: PathBuf::from(
                var("POS_REQUIREMENTS_FILE").unwrap_or_else(|| "requirements.txt".into()),
            ),
            platform: var("POS_PLATFORM").unwrap_or_else(host_platform_tag),
            requires_runtime: var("POS_REQUIRES_RUNTIME"),
            fetch: FetchConfig {
                program: var("POS_FETCH_PROGRAM").unwrap_or_else(|| "python".into()),
                args: fetch_args.split_whitespace().map(String::from).collect(),
                timeout: Duration::from_secs(
                    var("POS_FETCH_TIMEOUT_SECS")
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS),
                ),
            },
        }
    }

    pub fn version_path(&self) -> PathBuf {
        self.project_root.join(&self.version_file)
    }

    pub fn requirements_path(&self) -> PathBuf {
        self.project_root.join(&self.requirements_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = BuilderConfig::from_lookup(|_| None);
        assert_eq!(config.version_path(), PathBuf::from("./version.py"));
        assert_eq!(config.requirements_path(), PathBuf::from("./requirements.txt"));
        assert_eq!(config.platform, host_platform_tag());
        assert_eq!(config.fetch.program, "python");
        assert_eq!(config.fetch.args[..3], ["-m", "pip", "download"]);
        assert_eq!(config.fetch.timeout, Duration::from_secs(600));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("POS_PROJECT_ROOT", "/src/pos"),
            ("POS_PLATFORM", "win_amd64"),
            ("POS_FETCH_PROGRAM", "uv"),
            ("POS_FETCH_ARGS", "pip download -r {requirements}  -d {deps_dir}"),
            ("POS_FETCH_TIMEOUT_SECS", "bogus"),
        ]
        .into_iter()
        .collect();

        let config = BuilderConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.project_root, PathBuf::from("/src/pos"));
        assert_eq!(config.platform, "win_amd64");
        assert_eq!(config.fetch.program, "uv");
        assert_eq!(config.fetch.args.len(), 6);
        assert_eq!(config.fetch.timeout, Duration::from_secs(600));
    }
}
