use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::state::TransferState;
use crate::core::error::{InstallError, InstallResult};

/// Single-transfer HTTP(S) GET-to-file downloader.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
}

/// A transfer in flight. One handle drives exactly one download.
///
/// Dropping the handle before [`DownloadHandle::finish`] completes aborts
/// the transfer and removes whatever it had written.
#[derive(Debug)]
pub struct DownloadHandle {
    destination: PathBuf,
    state: Arc<TransferState>,
    task: JoinHandle<InstallResult<u64>>,
}

/// Result of a successful transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub path: PathBuf,
    pub bytes: u64,
    pub elapsed: Duration,
}

impl Downloader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Start streaming `url` into `destination` on a background task.
    ///
    /// A failed transfer leaves whatever was written at `destination`; removing
    /// it is the caller's job.
    pub fn start(&self, url: &str, destination: &Path) -> DownloadHandle {
        let state = Arc::new(TransferState::new());
        let task = tokio::spawn(run_transfer(
            self.client.clone(),
            url.to_string(),
            destination.to_path_buf(),
            Arc::clone(&state),
        ));

        DownloadHandle {
            destination: destination.to_path_buf(),
            state,
            task,
        }
    }
}

impl DownloadHandle {
    /// Shared view of the live counters, for progress sampling.
    pub fn state(&self) -> Arc<TransferState> {
        Arc::clone(&self.state)
    }

    /// Wait for the terminal outcome.
    pub async fn finish(mut self) -> InstallResult<DownloadOutcome> {
        let bytes = match (&mut self.task).await {
            Ok(result) => result?,
            Err(join_error) => {
                self.state.finish(true);
                return Err(join_error.into());
            }
        };

        Ok(DownloadOutcome {
            path: self.destination.clone(),
            bytes,
            elapsed: self.state.snapshot().elapsed,
        })
    }
}

impl Drop for DownloadHandle {
    fn drop(&mut self) {
        if !self.task.is_finished() {
            debug!("Aborting transfer into {:?}", self.destination);
            self.task.abort();
            self.state.finish(true);
        }
    }
}

/// The file a transfer writes. Removed if the transfer task is dropped
/// before reaching an outcome; kept otherwise.
struct PartialFile<'a> {
    path: &'a Path,
    settled: bool,
}

impl Drop for PartialFile<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        match std::fs::remove_file(self.path) {
            Ok(()) => debug!("Removed aborted download {:?}", self.path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove aborted download {:?}: {}", self.path, e),
        }
    }
}

async fn run_transfer(
    client: Client,
    url: String,
    destination: PathBuf,
    state: Arc<TransferState>,
) -> InstallResult<u64> {
    let mut partial = PartialFile {
        path: &destination,
        settled: false,
    };
    let result = stream_to_file(&client, &url, &destination, &state).await;
    partial.settled = true;

    // Transport errors are not reported on their own; the terminal flag is
    // authoritative and the returned error carries the detail.
    if let Err(e) = &result {
        debug!("Transfer of {} ended with error: {}", url, e);
    }
    state.finish(result.is_err());

    if let Ok(bytes) = &result {
        info!("Downloaded {} bytes: {} -> {:?}", bytes, url, destination);
    }
    result
}

async fn stream_to_file(
    client: &Client,
    url: &str,
    destination: &Path,
    state: &TransferState,
) -> InstallResult<u64> {
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| InstallError::io(parent, e))?;
    }

    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(InstallError::DownloadFailed {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let expected = response.content_length();
    state.set_total(expected);

    let mut received = 0_u64;
    // The handle is dropped at the end of this block, before the terminal flag flips.
    {
        // Created synchronously so an abort can never race a pending create.
        let file = std::fs::File::create(destination)
            .map_err(|e| InstallError::io(destination, e))?;
        let mut file = tokio::fs::File::from_std(file);

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk)
                .await
                .map_err(|e| InstallError::io(destination, e))?;
            received = received.saturating_add(chunk.len() as u64);
            state.add_bytes(chunk.len() as u64);
        }

        file.flush()
            .await
            .map_err(|e| InstallError::io(destination, e))?;
    }

    if let Some(expected) = expected {
        if received < expected {
            return Err(InstallError::TransferInterrupted {
                url: url.to_string(),
                received,
                expected: Some(expected),
            });
        }
    }

    Ok(received)
}
