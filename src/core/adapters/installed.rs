use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::core::component::Component;
use crate::core::error::{InstallError, InstallResult};
use crate::core::ports::InstalledStateStore;

/// What is known about one installed component.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstalledRecord {
    pub version: Option<String>,
    pub location: Option<PathBuf>,
    pub updated_at: DateTime<Utc>,
}

/// Installed components persisted as a JSON map next to the settings.
#[derive(Debug)]
pub struct JsonInstalledStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl JsonInstalledStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub async fn load(&self) -> InstallResult<BTreeMap<Component, InstalledRecord>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!("Corrupt installed state at {:?}: {}", self.path, e);
                BTreeMap::new()
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(InstallError::io(&self.path, e)),
        }
    }

    async fn update<F>(&self, component: Component, apply: F) -> InstallResult<()>
    where
        F: FnOnce(&mut InstalledRecord),
    {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load().await?;
        let record = records.entry(component).or_insert_with(|| InstalledRecord {
            version: None,
            location: None,
            updated_at: Utc::now(),
        });
        apply(record);
        record.updated_at = Utc::now();

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| InstallError::io(parent, e))?;
        }
        let payload = serde_json::to_vec_pretty(&records)?;
        tokio::fs::write(&self.path, payload)
            .await
            .map_err(|e| InstallError::io(&self.path, e))
    }
}

#[async_trait]
impl InstalledStateStore for JsonInstalledStore {
    async fn record_installed_version(
        &self,
        component: Component,
        version: &str,
    ) -> InstallResult<()> {
        info!("Recording {} version {}", component, version);
        let version = version.to_string();
        self.update(component, move |record| record.version = Some(version))
            .await
    }

    async fn record_installed(&self, component: Component, location: &Path) -> InstallResult<()> {
        let location = location.to_path_buf();
        self.update(component, move |record| record.location = Some(location))
            .await
    }
}
