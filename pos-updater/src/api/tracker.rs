//! Tracking of the single update attempt allowed at a time.

use crate::installer::InstallStage;
use crate::version::SemanticVersion;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct InstallAttempt {
    pub id: Uuid,
    pub version: SemanticVersion,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstallOutcome {
    pub id: Uuid,
    pub version: SemanticVersion,
    pub success: bool,
    /// Stage that failed, if the pipeline itself failed
    pub failed_stage: Option<InstallStage>,
    pub message: String,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TrackerSnapshot {
    pub current: Option<InstallAttempt>,
    pub last: Option<InstallOutcome>,
}

/// Guards against concurrent installs and remembers the last result.
#[derive(Clone, Default)]
pub struct InstallTracker {
    inner: Arc<RwLock<TrackerSnapshot>>,
}

impl InstallTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the installer. Returns `None` while another attempt runs.
    pub async fn begin(&self, version: SemanticVersion) -> Option<InstallAttempt> {
        let mut inner = self.inner.write().await;
        if inner.current.is_some() {
            return None;
        }

        let attempt = InstallAttempt {
            id: Uuid::new_v4(),
            version,
            started_at: Utc::now(),
        };
        inner.current = Some(attempt.clone());
        Some(attempt)
    }

    /// Release the installer after a successful attempt.
    pub async fn succeed(&self, attempt: &InstallAttempt, message: String) {
        self.record(attempt, true, None, message).await;
    }

    /// Release the installer after a failed attempt.
    pub async fn fail(&self, attempt: &InstallAttempt, failed_stage: Option<InstallStage>, message: String) {
        self.record(attempt, false, failed_stage, message).await;
    }

    async fn record(&self, attempt: &InstallAttempt, success: bool, failed_stage: Option<InstallStage>, message: String) {
        let mut inner = self.inner.write().await;
        if inner.current.as_ref().map(|c| c.id) == Some(attempt.id) {
            inner.current = None;
        }
        inner.last = Some(InstallOutcome {
            id: attempt.id,
            version: attempt.version,
            success,
            failed_stage,
            message,
            finished_at: Utc::now(),
        });
    }

    pub async fn is_busy(&self) -> bool {
        self.inner.read().await.current.is_some()
    }

    pub async fn snapshot(&self) -> TrackerSnapshot {
        self.inner.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_only_one_attempt_at_a_time() {
        let tracker = InstallTracker::new();
        let version = SemanticVersion::new(1, 0, 8);

        let attempt = tracker.begin(version).await.unwrap();
        assert!(tracker.is_busy().await);
        assert!(tracker.begin(version).await.is_none());

        tracker.succeed(&attempt, "installed".to_string()).await;
        assert!(!tracker.is_busy().await);

        let snapshot = tracker.snapshot().await;
        let last = snapshot.last.unwrap();
        assert_eq!(last.id, attempt.id);
        assert!(last.success);

        assert!(tracker.begin(version).await.is_some());
    }

    #[tokio::test]
    async fn test_failed_attempt_is_recorded() {
        let tracker = InstallTracker::new();
        let attempt = tracker.begin(SemanticVersion::new(2, 0, 0)).await.unwrap();
        tracker
            .fail(&attempt, Some(InstallStage::InstallingDependencies), "timed out".to_string())
            .await;

        let last = tracker.snapshot().await.last.unwrap();
        assert!(!last.success);
        assert_eq!(last.failed_stage, Some(InstallStage::InstallingDependencies));
    }
}
