//! Backup inventory endpoint.

use super::error::AppError;
use super::AppState;
use crate::installer::backup::{list_backups, BackupEntry};
use axum::{extract::State, Json};

/// GET /backups - Backups under the application root, oldest first
pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<BackupEntry>>, AppError> {
    let app_root = state.app_root.clone();
    let entries = tokio::task::spawn_blocking(move || list_backups(&app_root))
        .await
        .map_err(anyhow::Error::from)?
        .map_err(anyhow::Error::from)?;
    Ok(Json(entries))
}
