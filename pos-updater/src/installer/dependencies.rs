//! Dependency installation from the package's local artifact folder.
//!
//! Artifacts were downloaded by the package builder so that an offline
//! terminal can update. The installer must never reach the network and
//! must reinstall artifacts that are already present.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_INSTALL_TIMEOUT: Duration = Duration::from_secs(300);

const STDOUT_LOG: &str = "dependency_install.log";
const STDERR_LOG: &str = "dependency_install.err";
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Error, Debug)]
pub enum DependencyError {
    #[error("{0}")]
    Failed(String),

    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

/// One dependency installation job.
#[derive(Debug)]
pub struct DependencyRequest<'a> {
    /// The package's `dependencies/` folder, the only allowed source
    pub deps_dir: &'a Path,
    /// Artifacts found in `deps_dir`, sorted
    pub artifacts: &'a [PathBuf],
    /// Writable scratch space for logs, removed during cleanup
    pub scratch_dir: &'a Path,
}

/// Installs dependency artifacts into the running environment.
pub trait DependencyInstaller: Send + Sync {
    fn install(&self, request: &DependencyRequest<'_>) -> Result<(), DependencyError>;
}

/// Installable artifacts in `deps_dir` with one of `extensions`, sorted by
/// file name. A missing folder has no artifacts.
pub fn find_artifacts(deps_dir: &Path, extensions: &[String]) -> std::io::Result<Vec<PathBuf>> {
    if !deps_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut artifacts: Vec<PathBuf> = fs::read_dir(deps_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .map(|ext| extensions.iter().any(|want| ext.eq_ignore_ascii_case(want.as_str())))
                .unwrap_or(false)
        })
        .collect();

    artifacts.sort();
    Ok(artifacts)
}

/// Runs an external installer program with a bounded wait.
///
/// `{deps_dir}` in any argument is replaced by the artifact folder; the
/// artifact paths are appended after the configured arguments.
#[derive(Debug, Clone)]
pub struct CommandInstaller {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandInstaller {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: DEFAULT_INSTALL_TIMEOUT,
        }
    }

    /// `python -m pip install --force-reinstall --no-index --find-links <deps>`
    pub fn pip(python: impl Into<String>) -> Self {
        let args = ["-m", "pip", "install", "--force-reinstall", "--no-index", "--find-links", "{deps_dir}"];
        Self::new(python, args.iter().map(|a| a.to_string()).collect())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn command(&self, request: &DependencyRequest<'_>) -> Command {
        let deps_dir = request.deps_dir.to_string_lossy();
        let mut command = Command::new(&self.program);
        command
            .args(self.args.iter().map(|a| a.replace("{deps_dir}", &deps_dir)))
            .args(request.artifacts)
            .stdin(Stdio::null());
        command
    }

    fn wait(&self, child: &mut std::process::Child) -> Result<ExitStatus, DependencyError> {
        let started = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) if started.elapsed() >= self.timeout => {
                    warn!("{} did not finish within {:?}, killing it", self.program, self.timeout);
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(DependencyError::Timeout(self.timeout));
                }
                Ok(None) => std::thread::sleep(POLL_INTERVAL),
                Err(e) => return Err(DependencyError::Failed(format!("cannot wait for {}: {e}", self.program))),
            }
        }
    }
}

/// Last few lines of an installer log.
fn log_tail(path: &Path, lines: usize) -> String {
    let content = fs::read(path).map(|b| String::from_utf8_lossy(&b).into_owned()).unwrap_or_default();
    let all: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

impl DependencyInstaller for CommandInstaller {
    fn install(&self, request: &DependencyRequest<'_>) -> Result<(), DependencyError> {
        let failed = |what: &str, e: std::io::Error| DependencyError::Failed(format!("{what}: {e}"));

        fs::create_dir_all(request.scratch_dir).map_err(|e| failed("cannot create scratch dir", e))?;
        let stdout_path = request.scratch_dir.join(STDOUT_LOG);
        let stderr_path = request.scratch_dir.join(STDERR_LOG);
        let stdout = File::create(&stdout_path).map_err(|e| failed("cannot create log", e))?;
        let stderr = File::create(&stderr_path).map_err(|e| failed("cannot create log", e))?;

        info!(
            "Running {} for {} artifact(s) from {}",
            self.program,
            request.artifacts.len(),
            request.deps_dir.display()
        );

        let mut child = self
            .command(request)
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|e| failed(&format!("cannot start {}", self.program), e))?;

        let status = self.wait(&mut child)?;
        if status.success() {
            return Ok(());
        }

        let tail = log_tail(&stderr_path, 20);
        Err(DependencyError::Failed(if tail.is_empty() {
            format!("{} exited with {}", self.program, status)
        } else {
            format!("{} exited with {}: {}", self.program, status, tail)
        }))
    }
}
