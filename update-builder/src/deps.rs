//! Dependency staging for offline installs.
//!
//! The package carries pre-downloaded artifacts so the terminal never
//! needs network access. Fetching may fail in part; the terminal may
//! already have what is missing, so failures are reported, never fatal.

use crate::config::FetchConfig;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How dependency staging went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// No requirements file in the project
    NoRequirements,
    Fetched { artifacts: usize },
    Failed { detail: String },
    TimedOut { after: Duration },
}

/// `name==version` pins from a requirements file. Comments, blank lines
/// and unpinned requirements are ignored.
pub fn parse_requirements(content: &str) -> BTreeMap<String, String> {
    content
        .lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter(|line| !line.is_empty())
        .filter_map(|line| line.split_once("=="))
        .map(|(name, version)| (name.trim().to_string(), version.trim().to_string()))
        .filter(|(name, version)| !name.is_empty() && !version.is_empty())
        .collect()
}

fn drain<R: Read + Send + 'static>(reader: Option<R>) -> JoinHandle<String> {
    std::thread::spawn(move || {
        let mut text = String::new();
        if let Some(mut reader) = reader {
            let _ = reader.read_to_string(&mut text);
        }
        text
    })
}

fn wait(child: &mut Child, timeout: Duration) -> std::io::Result<Option<std::process::ExitStatus>> {
    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if started.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

/// Download the artifacts listed in `requirements` into `deps_dir`.
pub fn fetch_dependencies(fetch: &FetchConfig, requirements: &Path, deps_dir: &Path) -> FetchOutcome {
    if !requirements.is_file() {
        return FetchOutcome::NoRequirements;
    }

    let requirements_arg = requirements.to_string_lossy();
    let deps_arg = deps_dir.to_string_lossy();
    let args: Vec<String> = fetch
        .args
        .iter()
        .map(|a| a.replace("{requirements}", &requirements_arg).replace("{deps_dir}", &deps_arg))
        .collect();

    tracing::debug!("Running {} {}", fetch.program, args.join(" "));
    let mut child = match Command::new(&fetch.program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            return FetchOutcome::Failed {
                detail: format!("cannot start {}: {}", fetch.program, e),
            }
        }
    };

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = match wait(&mut child, fetch.timeout) {
        Ok(Some(status)) => status,
        Ok(None) => return FetchOutcome::TimedOut { after: fetch.timeout },
        Err(e) => {
            return FetchOutcome::Failed {
                detail: format!("cannot wait for {}: {}", fetch.program, e),
            }
        }
    };

    let _ = stdout.join();
    let stderr = stderr.join().unwrap_or_default();

    if !status.success() {
        return FetchOutcome::Failed {
            detail: format!("{} exited with {}: {}", fetch.program, status, stderr.trim()),
        };
    }

    FetchOutcome::Fetched {
        artifacts: count_artifacts(deps_dir),
    }
}

fn count_artifacts(deps_dir: &Path) -> usize {
    std::fs::read_dir(deps_dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| {
                    let name = e.file_name().to_string_lossy().to_lowercase();
                    name.ends_with(".whl") || name.ends_with(".tar.gz") || name.ends_with(".zip")
                })
                .count()
        })
        .unwrap_or(0)
}
