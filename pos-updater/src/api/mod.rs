//! Loopback HTTP API through which the host application learns about
//! pending updates and decides whether to install them.

pub mod backups;
pub mod error;
pub mod health;
pub mod pending;
pub mod tracker;
pub mod update;

use crate::installer::Updater;
use crate::restart::RestartCommand;
use crate::version::SemanticVersion;
use axum::{
    routing::{get, post},
    Router,
};
use pending::PendingUpdate;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracker::InstallTracker;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub terminal_id: String,
    pub app_root: PathBuf,
    pub app_version: Arc<RwLock<SemanticVersion>>,
    /// Held for the duration of an install, on a blocking worker
    pub updater: Arc<Mutex<Updater>>,
    pub pending: PendingUpdate,
    pub tracker: InstallTracker,
    /// `None` disables `POST /restart`
    pub restart: Option<RestartCommand>,
    /// Cancelled to stop the daemon
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(terminal_id: impl Into<String>, updater: Updater) -> Self {
        Self {
            terminal_id: terminal_id.into(),
            app_root: updater.app_root().to_path_buf(),
            app_version: Arc::new(RwLock::new(updater.current_version())),
            updater: Arc::new(Mutex::new(updater)),
            pending: PendingUpdate::new(),
            tracker: InstallTracker::new(),
            restart: None,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_restart(mut self, restart: RestartCommand) -> Self {
        self.restart = Some(restart);
        self
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(health::health))
        .route("/version", get(health::version))
        // Update endpoints
        .route("/update/pending", get(update::pending))
        .route("/update/status", get(update::status))
        .route("/update/inspect", post(update::inspect))
        .route("/update/check", post(update::check))
        .route("/update/apply", post(update::apply))
        .route("/update/dismiss", post(update::dismiss))
        .route("/restart", post(update::restart))
        // Backup inventory
        .route("/backups", get(backups::list))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
