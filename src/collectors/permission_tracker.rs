//! Permission failure tracking and reporting
//!
//! Direct copies need root on the device. This module remembers which
//! artifact kinds hit a permission wall during a run and tells the examiner
//! what can be done about it once the run is over.

use log::warn;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::ArtifactKind;

/// Tracks artifact kinds whose acquisition was refused for lack of privileges
#[derive(Debug, Clone, Default)]
pub struct PermissionTracker {
    denied: Arc<Mutex<BTreeSet<ArtifactKind>>>,
}

impl PermissionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a permission failure for a kind
    pub async fn record_permission_failure(&self, kind: ArtifactKind) {
        let mut denied = self.denied.lock().await;
        denied.insert(kind);
    }

    pub async fn failure_count(&self) -> usize {
        self.denied.lock().await.len()
    }

    pub async fn denied_kinds(&self) -> Vec<ArtifactKind> {
        self.denied.lock().await.iter().copied().collect()
    }

    /// Report permission failures and provide guidance
    pub async fn report_failures(&self, elevated: bool) {
        let denied = self.denied.lock().await;
        if denied.is_empty() {
            return;
        }

        warn!("Permission issues summary");
        warn!(
            "{} artifact kind(s) were refused direct access: {}",
            denied.len(),
            denied.iter().map(|k| k.name()).collect::<Vec<_>>().join(", ")
        );
        if elevated {
            warn!("  Root was granted but the files stayed unreadable; check SELinux denials in logcat");
        } else {
            warn!("  1. On userdebug/eng builds run 'adb root' before acquiring");
            warn!("  2. On rooted devices grant the shell su access when prompted");
            warn!("  3. Otherwise rely on the backup and content query results");
        }
        warn!("Note: acquisition continued with the remaining methods.");
    }

    /// Check if we should suggest obtaining elevated access
    pub async fn should_suggest_elevation(&self) -> bool {
        !self.denied.lock().await.is_empty()
    }
}
