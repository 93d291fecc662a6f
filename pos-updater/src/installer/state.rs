//! In-memory progress of one update attempt. Never persisted.

use serde::Serialize;
use std::fmt;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallStage {
    Validating,
    BackingUp,
    InstallingDependencies,
    InstallingFiles,
    CleaningUp,
}

impl fmt::Display for InstallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validating => "eligibility check",
            Self::BackingUp => "backup",
            Self::InstallingDependencies => "dependency installation",
            Self::InstallingFiles => "file installation",
            Self::CleaningUp => "cleanup",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "stage", rename_all = "snake_case")]
pub enum InstallationState {
    #[default]
    Idle,
    Running(InstallStage),
    Done,
    Failed(InstallStage),
}

impl InstallationState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running(_))
    }
}
