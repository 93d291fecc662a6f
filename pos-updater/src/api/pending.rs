//! The update offered to the host application, awaiting a decision.

use crate::package::UpdateManifest;
use crate::version::SemanticVersion;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

#[derive(Clone, Default)]
pub struct PendingUpdate {
    slot: Arc<RwLock<Option<UpdateManifest>>>,
}

impl PendingUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a newly detected package, replacing any previous offer.
    /// For use outside the async runtime, e.g. from the monitor callback.
    pub fn offer_blocking(&self, manifest: UpdateManifest) {
        let mut slot = self.slot.blocking_write();
        Self::replace(&mut slot, manifest);
    }

    pub async fn offer(&self, manifest: UpdateManifest) {
        let mut slot = self.slot.write().await;
        Self::replace(&mut slot, manifest);
    }

    fn replace(slot: &mut Option<UpdateManifest>, manifest: UpdateManifest) {
        info!(
            "Update {} pending from {}",
            manifest.version,
            manifest.package_path.display()
        );
        *slot = Some(manifest);
    }

    pub async fn get(&self) -> Option<UpdateManifest> {
        self.slot.read().await.clone()
    }

    pub async fn dismiss(&self) -> Option<UpdateManifest> {
        self.slot.write().await.take()
    }

    /// Drop the offer once `version` has been installed.
    pub async fn clear_installed(&self, version: SemanticVersion) {
        let mut slot = self.slot.write().await;
        if slot.as_ref().is_some_and(|m| m.version <= version) {
            *slot = None;
        }
    }
}
