//! Custom error types for the update agent.

use thiserror::Error;

use crate::version::marker::MarkerError;
use crate::version::InvalidVersionFormat;

#[derive(Error, Debug)]
pub enum UpdaterError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Version(#[from] InvalidVersionFormat),

    #[error("Version marker error: {0}")]
    Marker(#[from] MarkerError),

    #[error("Restart failed: {0}")]
    Restart(String),
}

pub type Result<T> = std::result::Result<T, UpdaterError>;
