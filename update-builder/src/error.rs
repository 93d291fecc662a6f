use pos_updater::fs::copy::CopyError;
use pos_updater::version::marker::MarkerError;
use pos_updater::version::{InvalidVersionFormat, SemanticVersion};
use std::path::PathBuf;

/// Fatal builder failures. Dependency fetch problems are not among them;
/// they only produce warnings.
#[derive(thiserror::Error, Debug)]
pub enum BuildError {
    #[error("invalid version format: {0} (expected X.Y.Z, e.g. 1.0.1)")]
    InvalidVersion(#[from] InvalidVersionFormat),

    #[error("new version {candidate} is not newer than the current version {current}")]
    VersionNotNewer {
        candidate: SemanticVersion,
        current: SemanticVersion,
    },

    #[error("cannot bump {0}: patch number is at its maximum, pass an explicit version")]
    VersionOverflow(SemanticVersion),

    #[error("target volume {} not found", .0.display())]
    TargetNotFound(PathBuf),

    #[error("project root {} not found", .0.display())]
    ProjectNotFound(PathBuf),

    #[error(transparent)]
    Marker(#[from] MarkerError),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Copy(#[from] CopyError),

    #[error("cannot serialize manifest: {0}")]
    Manifest(#[from] serde_json::Error),
}

impl BuildError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
