//! The embedded version marker.
//!
//! The application records its running version in a source file as a
//! single line of the form `VERSION = "1.0.7"`. The agent reads it to learn
//! the running version; the package builder rewrites it in the packaged
//! copy.

use super::{InvalidVersionFormat, SemanticVersion};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const MARKER_KEY: &str = "VERSION";

#[derive(Error, Debug)]
pub enum MarkerError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no VERSION marker line in {}", .0.display())]
    Missing(PathBuf),

    #[error("bad VERSION marker in {}: {source}", path.display())]
    Invalid {
        path: PathBuf,
        #[source]
        source: InvalidVersionFormat,
    },
}

/// Returns the quoted value if `line` is a marker line.
fn marker_value(line: &str) -> Option<&str> {
    let rest = line.trim().strip_prefix(MARKER_KEY)?;
    let value = rest.trim_start().strip_prefix('=')?.trim();
    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value);
    Some(value)
}

/// Extract the version from marker file contents.
pub fn parse_marker(content: &str) -> Option<Result<SemanticVersion, InvalidVersionFormat>> {
    content
        .lines()
        .find_map(marker_value)
        .map(SemanticVersion::parse)
}

/// Read the running version from a marker file.
pub fn read_marker(path: &Path) -> Result<SemanticVersion, MarkerError> {
    let content = fs::read_to_string(path).map_err(|source| MarkerError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    match parse_marker(&content) {
        Some(Ok(version)) => Ok(version),
        Some(Err(source)) => Err(MarkerError::Invalid {
            path: path.to_path_buf(),
            source,
        }),
        None => Err(MarkerError::Missing(path.to_path_buf())),
    }
}

/// Replace every marker line in `content` with `version`.
/// Returns `None` if there was no marker line.
pub fn rewrite_content(content: &str, version: &SemanticVersion) -> Option<String> {
    let mut found = false;
    let lines: Vec<String> = content
        .split('\n')
        .map(|line| {
            if marker_value(line).is_some() {
                found = true;
                format!("{MARKER_KEY} = \"{version}\"")
            } else {
                line.to_string()
            }
        })
        .collect();

    found.then(|| lines.join("\n"))
}

/// Rewrite the marker in place.
pub fn write_marker(path: &Path, version: &SemanticVersion) -> Result<(), MarkerError> {
    let io_err = |source| MarkerError::Io {
        path: path.to_path_buf(),
        source,
    };

    let content = fs::read_to_string(path).map_err(io_err)?;
    let updated =
        rewrite_content(&content, version).ok_or_else(|| MarkerError::Missing(path.to_path_buf()))?;
    fs::write(path, updated).map_err(io_err)
}
