// ─── Boundaries ───
// Everything the pipeline talks to but does not own: the progress UI,
// user notifications, release metadata, persisted install state and
// OS-specific integration (registry, shortcuts).

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::component::Component;
use super::error::InstallResult;
use super::pipeline::RunId;

/// Progress rows in the UI, one per pipeline run.
///
/// Implementations must not block.
pub trait ProgressSink: Send + Sync {
    fn add_progress_item(
        &self,
        run_id: RunId,
        title: &str,
        subtitle: &str,
        message: &str,
        percentage: u8,
    );

    fn stop_progress_item(&self, run_id: RunId);
}

/// Fire-and-forget user notifications.
pub trait InstallNotifier: Send + Sync {
    fn notify_installed(&self, component: Component);
    fn notify_failed_install(&self, component: Component, error_detail: &str);
    fn notify_already_installing(&self);
}

/// Latest published release of a component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    #[serde(default)]
    pub tag_name: Option<String>,
}

#[async_trait]
pub trait ReleaseLookup: Send + Sync {
    async fn fetch_latest_release_info(&self, component: Component) -> InstallResult<ReleaseInfo>;
}

#[async_trait]
pub trait InstalledStateStore: Send + Sync {
    async fn record_installed_version(
        &self,
        component: Component,
        version: &str,
    ) -> InstallResult<()>;

    async fn record_installed(&self, component: Component, location: &Path) -> InstallResult<()>;
}

/// OS integration helpers used by post-processing. Every call must be
/// safe to repeat.
#[async_trait]
pub trait PlatformIntegration: Send + Sync {
    async fn register_install_path(&self, component: Component, path: &Path)
        -> InstallResult<()>;

    async fn create_shortcut(&self, component: Component, target: &Path) -> InstallResult<()>;
}
