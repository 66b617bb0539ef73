use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::extract::ArchiveKind;

/// Installable components. Strongly typed, no magic strings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    /// Base game client, shipped as a zipped cabinet chain.
    PrimaryClient,
    /// Content patch applied on top of the client directory.
    ContentPatch,
    /// Optional variant (skin) client installed next to the base client.
    VariantClient,
    /// The launcher binary itself.
    LauncherUpdate,
}

impl Component {
    pub const ALL: [Component; 4] = [
        Component::PrimaryClient,
        Component::ContentPatch,
        Component::VariantClient,
        Component::LauncherUpdate,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            Component::PrimaryClient => "Call of Duty 4 Client",
            Component::ContentPatch => "CoD4x Patch",
            Component::VariantClient => "IW3xo Client",
            Component::LauncherUpdate => "Launcher",
        }
    }

    /// Short identifier used in temp artifact names and settings keys.
    pub fn slug(&self) -> &'static str {
        match self {
            Component::PrimaryClient => "client",
            Component::ContentPatch => "patch",
            Component::VariantClient => "variant",
            Component::LauncherUpdate => "launcher",
        }
    }

    /// How the downloaded blob is unpacked.
    pub fn archive_kind(&self) -> ArchiveKind {
        match self {
            Component::PrimaryClient => ArchiveKind::CabinetChain,
            _ => ArchiveKind::Zip,
        }
    }

    /// Size assumed when the server omits `Content-Length`.
    pub fn nominal_download_bytes(&self) -> u64 {
        match self {
            Component::PrimaryClient => 6 * 1024 * 1024 * 1024,
            Component::ContentPatch => 60 * 1024 * 1024,
            Component::VariantClient => 120 * 1024 * 1024,
            Component::LauncherUpdate => 15 * 1024 * 1024,
        }
    }

    /// Directory the archive is extracted into, relative to the requested path.
    pub fn install_dir(&self, destination: &Path) -> PathBuf {
        match self {
            Component::VariantClient => destination.join("iw3xo"),
            _ => destination.to_path_buf(),
        }
    }

    /// File whose presence marks the component as installed.
    pub fn marker_file(&self) -> &'static str {
        match self {
            Component::PrimaryClient => "iw3mp.exe",
            Component::ContentPatch => "main/xcommon_cod4x.iwd",
            Component::VariantClient => "iw3xo.exe",
            Component::LauncherUpdate => launcher_exe(),
        }
    }

    pub fn executable_path(&self, destination: &Path) -> PathBuf {
        self.install_dir(destination).join(self.marker_file())
    }

    /// Probe whether this component is already present under `destination`.
    pub fn is_installed_at(&self, destination: &Path) -> bool {
        self.executable_path(destination).is_file()
    }
}

fn launcher_exe() -> &'static str {
    if cfg!(target_os = "windows") {
        "launcher.exe"
    } else {
        "launcher"
    }
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

impl std::str::FromStr for Component {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let needle = raw.trim().to_ascii_lowercase();
        Component::ALL
            .into_iter()
            .find(|c| c.slug() == needle || format!("{c:?}").to_ascii_lowercase() == needle)
            .ok_or_else(|| format!("unknown component '{raw}'"))
    }
}

/// A request to install one component, consumed by exactly one pipeline run.
#[derive(Debug, Clone)]
pub struct InstallRequest {
    pub component: Component,
    pub destination: PathBuf,
    /// Display label of the component this install belongs to, if any.
    pub parent_label: Option<String>,
}

impl InstallRequest {
    pub fn new(component: Component, destination: impl Into<PathBuf>) -> Self {
        Self {
            component,
            destination: destination.into(),
            parent_label: None,
        }
    }

    pub fn with_parent_label(mut self, label: impl Into<String>) -> Self {
        self.parent_label = Some(label.into());
        self
    }

    /// Title shown on the progress row.
    pub fn title(&self) -> String {
        match &self.parent_label {
            Some(parent) => format!("{parent}: {}", self.component.display_name()),
            None => self.component.display_name().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_slugs_and_variant_names() {
        assert_eq!("patch".parse::<Component>(), Ok(Component::ContentPatch));
        assert_eq!(
            "VariantClient".parse::<Component>(),
            Ok(Component::VariantClient)
        );
        assert!("server".parse::<Component>().is_err());
    }

    #[test]
    fn variant_client_lives_in_subdirectory() {
        let dest = Path::new("/games/cod4");
        assert_eq!(
            Component::VariantClient.install_dir(dest),
            PathBuf::from("/games/cod4/iw3xo")
        );
        assert_eq!(Component::ContentPatch.install_dir(dest), dest);
    }

    #[test]
    fn installed_probe_checks_marker_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!Component::PrimaryClient.is_installed_at(dir.path()));

        std::fs::write(dir.path().join("iw3mp.exe"), b"MZ").unwrap();
        assert!(Component::PrimaryClient.is_installed_at(dir.path()));
    }

    #[test]
    fn title_includes_parent_label() {
        let request =
            InstallRequest::new(Component::ContentPatch, "/tmp").with_parent_label("CoD4");
        assert_eq!(request.title(), "CoD4: CoD4x Patch");
    }
}
