//! Update decision endpoints used by the host application.
//!
//! Detection only ever produces an offer. Nothing is installed until the
//! host calls `POST /update/apply`, and nothing is restarted until it calls
//! `POST /restart`.

use super::error::AppError;
use super::tracker::{InstallAttempt, TrackerSnapshot};
use super::AppState;
use crate::installer::{UpdateReport, Updater};
use crate::package::{load_from_path, UpdateManifest};
use anyhow::anyhow;
use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{MutexGuard, TryLockError};
use std::time::Duration;
use uuid::Uuid;

const RESTART_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Serialize)]
pub struct PackageView {
    pub manifest: UpdateManifest,
    pub package_path: PathBuf,
}

impl From<UpdateManifest> for PackageView {
    fn from(manifest: UpdateManifest) -> Self {
        let package_path = manifest.package_path.clone();
        Self { manifest, package_path }
    }
}

/// Optional explicit package location; the pending offer is used when
/// absent.
#[derive(Debug, Default, Deserialize)]
pub struct PackageRequest {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct InspectRequest {
    pub path: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct EligibilityResponse {
    pub eligible: bool,
    pub reason: String,
    pub package: PackageView,
}

#[derive(Debug, Serialize)]
pub struct ApplyResponse {
    pub attempt_id: Uuid,
    pub report: UpdateReport,
    pub restart_required: bool,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub pending: Option<PackageView>,
    #[serde(flatten)]
    pub tracker: TrackerSnapshot,
}

fn try_lock_updater(state: &AppState) -> Result<MutexGuard<'_, Updater>, AppError> {
    match state.updater.try_lock() {
        Ok(guard) => Ok(guard),
        Err(TryLockError::WouldBlock) => Err(AppError::Conflict("an update is being installed".into())),
        Err(TryLockError::Poisoned(_)) => Err(AppError::Internal(anyhow!("updater lock poisoned"))),
    }
}

/// Read and validate the package at `path` on a blocking worker; the
/// volume may be slow removable media.
async fn load_blocking(path: PathBuf) -> Result<UpdateManifest, AppError> {
    tokio::task::spawn_blocking(move || load_from_path(&path))
        .await
        .map_err(anyhow::Error::from)?
        .map_err(|e| AppError::Unprocessable(e.to_string()))
}

async fn resolve_package(state: &AppState, req: PackageRequest) -> Result<UpdateManifest, AppError> {
    match req.path {
        Some(path) => load_blocking(path).await,
        None => state
            .pending
            .get()
            .await
            .ok_or_else(|| AppError::NotFound("no pending update".into())),
    }
}

/// GET /update/pending - The offered update, or `null`
pub async fn pending(State(state): State<AppState>) -> Json<Option<PackageView>> {
    Json(state.pending.get().await.map(Into::into))
}

/// POST /update/inspect - Validate a package at an explicit path
pub async fn inspect(
    State(state): State<AppState>,
    Json(req): Json<InspectRequest>,
) -> Result<Json<EligibilityResponse>, AppError> {
    let manifest = load_blocking(req.path).await?;
    let (eligible, reason) = {
        let updater = try_lock_updater(&state)?;
        updater.can_update(&manifest)
    };
    if eligible {
        state.pending.offer(manifest.clone()).await;
    }

    Ok(Json(EligibilityResponse {
        eligible,
        reason,
        package: manifest.into(),
    }))
}

/// POST /update/check - Eligibility of the pending or given package
pub async fn check(
    State(state): State<AppState>,
    Json(req): Json<PackageRequest>,
) -> Result<Json<EligibilityResponse>, AppError> {
    let manifest = resolve_package(&state, req).await?;
    let (eligible, reason) = {
        let updater = try_lock_updater(&state)?;
        updater.can_update(&manifest)
    };

    Ok(Json(EligibilityResponse {
        eligible,
        reason,
        package: manifest.into(),
    }))
}

/// POST /update/apply - Install the pending or given package
///
/// Runs the whole pipeline on a blocking worker and answers when it is
/// done. The host decides afterwards whether to restart.
pub async fn apply(
    State(state): State<AppState>,
    Json(req): Json<PackageRequest>,
) -> Result<Json<ApplyResponse>, AppError> {
    let manifest = resolve_package(&state, req).await?;

    let attempt = state
        .tracker
        .begin(manifest.version)
        .await
        .ok_or_else(|| AppError::Conflict("an update is already being installed".into()))?;
    tracing::info!("Install attempt {} for version {}", attempt.id, manifest.version);

    // Detached so the attempt is recorded even if the client goes away.
    let response = tokio::spawn(run_install(state, attempt, manifest))
        .await
        .map_err(|e| AppError::Internal(e.into()))??;

    Ok(Json(response))
}

/// Run one install attempt and settle the tracker, running version and
/// pending offer with its outcome.
async fn run_install(
    state: AppState,
    attempt: InstallAttempt,
    manifest: UpdateManifest,
) -> Result<ApplyResponse, AppError> {
    let updater = state.updater.clone();
    let joined = tokio::task::spawn_blocking(move || {
        let mut updater = updater.lock().map_err(|_| anyhow!("updater lock poisoned"))?;
        Ok::<_, anyhow::Error>(updater.perform_update(&manifest))
    })
    .await;

    let result = match joined {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            state.tracker.fail(&attempt, None, e.to_string()).await;
            return Err(AppError::Internal(e));
        }
        Err(e) => {
            state.tracker.fail(&attempt, None, format!("install worker failed: {e}")).await;
            return Err(AppError::Internal(e.into()));
        }
    };

    match result {
        Ok(report) => {
            state
                .tracker
                .succeed(&attempt, format!("installed {}", report.to_version))
                .await;
            *state.app_version.write().await = report.to_version;
            state.pending.clear_installed(report.to_version).await;

            Ok(ApplyResponse {
                attempt_id: attempt.id,
                report,
                restart_required: true,
            })
        }
        Err(e) => {
            state.tracker.fail(&attempt, Some(e.stage()), e.to_string()).await;
            Err(e.into())
        }
    }
}

/// POST /update/dismiss - Decline the pending offer
pub async fn dismiss(State(state): State<AppState>) -> StatusCode {
    match state.pending.dismiss().await {
        Some(manifest) => {
            tracing::info!("Update {} dismissed", manifest.version);
            StatusCode::NO_CONTENT
        }
        None => StatusCode::NOT_FOUND,
    }
}

/// GET /update/status - Pending offer plus current and last attempt
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        pending: state.pending.get().await.map(Into::into),
        tracker: state.tracker.snapshot().await,
    })
}

/// POST /restart - Relaunch the application and stop this daemon
pub async fn restart(State(state): State<AppState>) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let Some(command) = state.restart.clone() else {
        return Err(AppError::ServiceUnavailable("restart is not configured".into()));
    };

    if state.tracker.is_busy().await {
        return Err(AppError::Conflict("an update is being installed".into()));
    }

    let child = command.spawn().map_err(|e| AppError::Internal(e.into()))?;
    tracing::info!("Started {} (pid {}), shutting down", command.program, child.id());

    let shutdown = state.shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(RESTART_GRACE).await;
        shutdown.cancel();
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "restarting", "pid": child.id() })),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{write_package, PackageSpec};
    use tempfile::TempDir;

    #[tokio::test(flavor = "current_thread")]
    async fn test_load_blocking_reads_package_off_runtime() {
        let usb = TempDir::new().unwrap();
        write_package(usb.path(), &PackageSpec::new("1.0.8"));

        let manifest = load_blocking(usb.path().to_path_buf()).await.unwrap();
        assert_eq!(manifest.version.to_string(), "1.0.8");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_load_blocking_maps_invalid_package_to_unprocessable() {
        let usb = TempDir::new().unwrap();

        let err = load_blocking(usb.path().join("missing")).await.unwrap_err();
        assert!(matches!(err, AppError::Unprocessable(_)));
    }
}
