use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::component::Component;
use super::error::{InstallError, InstallResult};

const APP_DIR_NAME: &str = "LauncherInstaller";
const SETTINGS_FILE: &str = "installer_settings.json";
const DEFAULT_MIRROR: &str = "https://cod4x.ovh/launcher/dl";

/// Where a component is fetched from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComponentSource {
    pub url: String,
    /// GitHub `owner/repo` queried for the release tag, if versioned.
    #[serde(default)]
    pub release_repo: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallerConfig {
    pub data_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub progress_interval_ms: u64,
    pub http_timeout_secs: u64,
    /// Extra free space required on top of twice the archive size.
    pub min_free_disk_margin_bytes: u64,
    pub sources: BTreeMap<Component, ComponentSource>,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            temp_dir: std::env::temp_dir().join(APP_DIR_NAME),
            data_dir,
            progress_interval_ms: 250,
            http_timeout_secs: 120,
            min_free_disk_margin_bytes: 64 * 1024 * 1024,
            sources: default_sources(),
        }
    }
}

impl InstallerConfig {
    /// Load settings from `data_dir`, falling back to defaults on any problem.
    pub fn load_or_default(data_dir: &Path) -> Self {
        let path = data_dir.join(SETTINGS_FILE);
        let mut config = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<InstallerConfig>(&raw) {
                Ok(cfg) => cfg,
                Err(e) => {
                    warn!("Corrupt settings at {:?}: {}", path, e);
                    InstallerConfig::default()
                }
            },
            Err(_) => InstallerConfig::default(),
        };
        config.data_dir = data_dir.to_path_buf();

        // Partial files keep defaults for components they don't mention.
        for (component, source) in default_sources() {
            config.sources.entry(component).or_insert(source);
        }
        config
    }

    pub fn save(&self) -> InstallResult<()> {
        std::fs::create_dir_all(&self.data_dir)
            .map_err(|e| InstallError::io(&self.data_dir, e))?;
        let path = self.data_dir.join(SETTINGS_FILE);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json).map_err(|e| InstallError::io(path, e))
    }

    pub fn source(&self, component: Component) -> ComponentSource {
        self.sources
            .get(&component)
            .cloned()
            .unwrap_or_else(|| default_source(component))
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms.max(10))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn installed_state_path(&self) -> PathBuf {
        self.data_dir.join("installed_components.json")
    }
}

pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

fn default_sources() -> BTreeMap<Component, ComponentSource> {
    Component::ALL
        .into_iter()
        .map(|c| (c, default_source(c)))
        .collect()
}

fn default_source(component: Component) -> ComponentSource {
    let (file, repo) = match component {
        Component::PrimaryClient => ("cod4_client_cabs.zip", None),
        Component::ContentPatch => ("cod4x_patch.zip", Some("callofduty4x/CoD4x_Client_pub")),
        Component::VariantClient => ("iw3xo.zip", Some("xoxor4d/iw3xo-dev")),
        Component::LauncherUpdate => ("launcher.zip", Some("callofduty4x/CoD4x-launcher")),
    };
    ComponentSource {
        url: format!("{DEFAULT_MIRROR}/{file}"),
        release_repo: repo.map(str::to_string),
    }
}
