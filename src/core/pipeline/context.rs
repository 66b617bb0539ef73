use std::sync::Arc;

use crate::core::config::InstallerConfig;
use crate::core::downloader::Downloader;
use crate::core::extract::Extractor;
use crate::core::ports::{
    InstallNotifier, InstalledStateStore, PlatformIntegration, ProgressSink, ReleaseLookup,
};

/// Everything a pipeline needs besides its request.
/// Cheap to clone; shared by every run a coordinator starts.
#[derive(Clone)]
pub struct PipelineContext {
    pub config: Arc<InstallerConfig>,
    pub downloader: Downloader,
    pub extractor: Extractor,
    pub progress: Arc<dyn ProgressSink>,
    pub notifier: Arc<dyn InstallNotifier>,
    pub releases: Arc<dyn ReleaseLookup>,
    pub installed: Arc<dyn InstalledStateStore>,
    pub platform: Arc<dyn PlatformIntegration>,
}
