pub mod cabinet;
pub mod zip_archive;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;

use crate::core::error::{InstallError, InstallResult};

/// Supported archive formats. Both share the same extraction contract.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveKind {
    Zip,
    /// First cabinet plus linked continuations.
    CabinetChain,
}

/// One file written by an extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedEntry {
    /// Path relative to the destination, `/`-separated.
    pub name: String,
    /// 1-based position across the whole extraction.
    pub index: usize,
}

/// Unpacks archives into an existing directory.
///
/// Not transactional: a failure may leave the destination partially populated.
#[derive(Debug, Clone, Default)]
pub struct Extractor;

impl Extractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract `archive` into `destination`, sending one entry per written file.
    ///
    /// `destination` must already exist. Runs on the blocking pool.
    pub async fn extract(
        &self,
        kind: ArchiveKind,
        archive: &Path,
        destination: &Path,
        entries: mpsc::UnboundedSender<ExtractedEntry>,
    ) -> InstallResult<usize> {
        let metadata = tokio::fs::metadata(destination)
            .await
            .map_err(|e| InstallError::io(destination, e))?;
        if !metadata.is_dir() {
            return Err(InstallError::io(
                destination,
                std::io::Error::other("extraction target is not a directory"),
            ));
        }

        let archive: PathBuf = archive.to_path_buf();
        let destination: PathBuf = destination.to_path_buf();
        info!("Extracting {:?} ({:?}) into {:?}", archive, kind, destination);

        tokio::task::spawn_blocking(move || {
            let mut forward = |entry: ExtractedEntry| {
                // The receiver may have gone away; extraction still completes.
                let _ = entries.send(entry);
            };
            match kind {
                ArchiveKind::Zip => {
                    zip_archive::extract_zip_file(&archive, &destination, &mut forward)
                }
                ArchiveKind::CabinetChain => {
                    cabinet::extract_cabinet_chain(&archive, &destination, &mut forward)
                }
            }
        })
        .await?
    }
}
