use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use crate::core::component::Component;
use crate::core::error::InstallResult;
use crate::core::ports::PlatformIntegration;

/// Used where the OS offers no registry or shortcut helpers.
#[derive(Debug, Clone, Default)]
pub struct NoopPlatform;

#[async_trait]
impl PlatformIntegration for NoopPlatform {
    async fn register_install_path(
        &self,
        component: Component,
        path: &Path,
    ) -> InstallResult<()> {
        debug!("Skipping install path registration for {} at {:?}", component, path);
        Ok(())
    }

    async fn create_shortcut(&self, component: Component, target: &Path) -> InstallResult<()> {
        debug!("Skipping shortcut for {} -> {:?}", component, target);
        Ok(())
    }
}
