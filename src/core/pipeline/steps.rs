// ─── Post-processing ───
// Component-specific actions run after extraction. Each one must be safe
// to run again on a repeated install.

use std::path::Path;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::core::component::Component;
use crate::core::error::{InstallError, InstallResult};
use crate::core::ports::{InstalledStateStore, PlatformIntegration, ReleaseLookup};

use super::run::RunId;

pub struct StepContext<'a> {
    pub run_id: RunId,
    pub component: Component,
    /// Path the user asked for.
    pub destination: &'a Path,
    /// Where the archive was extracted.
    pub install_dir: &'a Path,
    pub releases: &'a dyn ReleaseLookup,
    pub installed: &'a dyn InstalledStateStore,
    pub platform: &'a dyn PlatformIntegration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Done,
    /// The step established the installed version label.
    Versioned(String),
}

#[async_trait]
pub trait PostProcessStep: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, ctx: &StepContext<'_>) -> InstallResult<StepOutcome>;
}

/// Ordered post-processing table for a component.
pub fn steps_for(component: Component) -> Vec<Box<dyn PostProcessStep>> {
    match component {
        Component::PrimaryClient => vec![boxed(RegisterInstallPath), boxed(CreateShortcut)],
        Component::ContentPatch => vec![boxed(RecordReleaseVersion)],
        Component::VariantClient => vec![boxed(CreateShortcut), boxed(RecordReleaseVersion)],
        Component::LauncherUpdate => vec![boxed(MarkExecutable), boxed(RecordReleaseVersion)],
    }
}

fn boxed<S: PostProcessStep + 'static>(step: S) -> Box<dyn PostProcessStep> {
    Box::new(step)
}

fn as_step_error(step: &str, err: InstallError) -> InstallError {
    match err {
        InstallError::PostProcess { .. } => err,
        other => InstallError::post_process(step, other.to_string()),
    }
}

/// Looks up the latest release tag and stores it as the installed version.
///
/// Missing tags, lookup failures and store failures only skip the label.
pub struct RecordReleaseVersion;

#[async_trait]
impl PostProcessStep for RecordReleaseVersion {
    fn name(&self) -> &'static str {
        "record-release-version"
    }

    async fn run(&self, ctx: &StepContext<'_>) -> InstallResult<StepOutcome> {
        let release = match ctx.releases.fetch_latest_release_info(ctx.component).await {
            Ok(release) => release,
            Err(e) => {
                warn!(run_id = %ctx.run_id, "Release lookup for {} failed: {}", ctx.component, e);
                return Ok(StepOutcome::Done);
            }
        };

        let Some(tag) = release.tag_name else {
            return Ok(StepOutcome::Done);
        };

        if let Err(e) = ctx
            .installed
            .record_installed_version(ctx.component, &tag)
            .await
        {
            warn!(run_id = %ctx.run_id, "Could not persist version {} of {}: {}", tag, ctx.component, e);
        }
        Ok(StepOutcome::Versioned(tag))
    }
}

/// Points the OS at the installed directory (registry on Windows).
pub struct RegisterInstallPath;

#[async_trait]
impl PostProcessStep for RegisterInstallPath {
    fn name(&self) -> &'static str {
        "register-install-path"
    }

    async fn run(&self, ctx: &StepContext<'_>) -> InstallResult<StepOutcome> {
        ctx.platform
            .register_install_path(ctx.component, ctx.install_dir)
            .await
            .map_err(|e| as_step_error(self.name(), e))?;
        Ok(StepOutcome::Done)
    }
}

pub struct CreateShortcut;

#[async_trait]
impl PostProcessStep for CreateShortcut {
    fn name(&self) -> &'static str {
        "create-shortcut"
    }

    async fn run(&self, ctx: &StepContext<'_>) -> InstallResult<StepOutcome> {
        let target = ctx.component.executable_path(ctx.destination);
        ctx.platform
            .create_shortcut(ctx.component, &target)
            .await
            .map_err(|e| as_step_error(self.name(), e))?;
        Ok(StepOutcome::Done)
    }
}

/// Restores the executable bit on the installed binary.
pub struct MarkExecutable;

#[async_trait]
impl PostProcessStep for MarkExecutable {
    fn name(&self) -> &'static str {
        "mark-executable"
    }

    async fn run(&self, ctx: &StepContext<'_>) -> InstallResult<StepOutcome> {
        let binary = ctx.component.executable_path(ctx.destination);
        let metadata = tokio::fs::metadata(&binary).await.map_err(|e| {
            InstallError::post_process(self.name(), format!("{}: {e}", binary.display()))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut permissions = metadata.permissions();
            if permissions.mode() & 0o111 != 0o111 {
                permissions.set_mode(permissions.mode() | 0o755);
                tokio::fs::set_permissions(&binary, permissions)
                    .await
                    .map_err(|e| InstallError::post_process(self.name(), e.to_string()))?;
                info!("Marked {:?} executable", binary);
            }
        }
        #[cfg(not(unix))]
        let _ = metadata;

        Ok(StepOutcome::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::core::test_support::{RecordingPorts, StaticReleases};

    fn ctx<'a>(
        component: Component,
        dir: &'a Path,
        releases: &'a StaticReleases,
        ports: &'a RecordingPorts,
    ) -> StepContext<'a> {
        StepContext {
            run_id: RunId::from_raw(1),
            component,
            destination: dir,
            install_dir: dir,
            releases,
            installed: ports,
            platform: ports,
        }
    }

    #[tokio::test]
    async fn release_tag_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let releases = StaticReleases::tagged("v1.2.3");
        let ports = RecordingPorts::default();

        let outcome = RecordReleaseVersion
            .run(&ctx(Component::ContentPatch, dir.path(), &releases, &ports))
            .await
            .unwrap();

        assert_eq!(outcome, StepOutcome::Versioned("v1.2.3".into()));
        assert_eq!(
            ports.versions(),
            vec![(Component::ContentPatch, "v1.2.3".to_string())]
        );
    }

    #[tokio::test]
    async fn missing_tag_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let releases = StaticReleases::untagged();
        let ports = RecordingPorts::default();

        let outcome = RecordReleaseVersion
            .run(&ctx(Component::VariantClient, dir.path(), &releases, &ports))
            .await
            .unwrap();

        assert_eq!(outcome, StepOutcome::Done);
        assert!(ports.versions().is_empty());
    }

    #[tokio::test]
    async fn denied_registration_is_post_process_error() {
        let dir = tempfile::tempdir().unwrap();
        let releases = StaticReleases::untagged();
        let ports = RecordingPorts::default().deny_platform();

        let err = RegisterInstallPath
            .run(&ctx(Component::PrimaryClient, dir.path(), &releases, &ports))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::PostProcess);
        assert!(err.to_string().contains("register-install-path"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn mark_executable_is_repeatable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let binary = Component::LauncherUpdate.executable_path(dir.path());
        std::fs::write(&binary, b"#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o644)).unwrap();
        let releases = StaticReleases::untagged();
        let ports = RecordingPorts::default();
        let ctx = ctx(Component::LauncherUpdate, dir.path(), &releases, &ports);

        MarkExecutable.run(&ctx).await.unwrap();
        MarkExecutable.run(&ctx).await.unwrap();

        let mode = std::fs::metadata(&binary).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn every_component_has_a_step_table() {
        assert_eq!(steps_for(Component::PrimaryClient).len(), 2);
        let launcher: Vec<_> = steps_for(Component::LauncherUpdate)
            .iter()
            .map(|s| s.name())
            .collect();
        assert_eq!(launcher, vec!["mark-executable", "record-release-version"]);
    }
}
