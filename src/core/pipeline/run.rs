use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::component::{Component, InstallRequest};

static LAST_RUN_ID: AtomicU64 = AtomicU64::new(0);

/// Identifies one pipeline run; keys its progress row and temp artifacts.
///
/// Derived from the wall clock in milliseconds and strictly increasing
/// within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(u64);

impl RunId {
    pub fn next() -> Self {
        let now = Utc::now().timestamp_millis().max(0) as u64;
        let mut previous = LAST_RUN_ID.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(previous + 1);
            match LAST_RUN_ID.compare_exchange_weak(
                previous,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return RunId(candidate),
                Err(actual) => previous = actual,
            }
        }
    }

    pub fn from_raw(raw: u64) -> Self {
        RunId(raw)
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Linear install state machine; any non-terminal state may go to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Created,
    Downloading,
    PreparingDestination,
    Extracting,
    PostProcessing,
    Finalized,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Finalized | PipelineState::Failed)
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;
        match (self, next) {
            (from, Failed) => !from.is_terminal(),
            (Created, Downloading)
            | (Downloading, PreparingDestination)
            | (PreparingDestination, Extracting)
            | (Extracting, PostProcessing)
            | (PostProcessing, Finalized) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            PipelineState::Created => "created",
            PipelineState::Downloading => "downloading",
            PipelineState::PreparingDestination => "preparing destination",
            PipelineState::Extracting => "extracting",
            PipelineState::PostProcessing => "post-processing",
            PipelineState::Finalized => "finalized",
            PipelineState::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Temporary files and directories owned by a run.
///
/// Whatever is still tracked when this is dropped gets removed.
#[derive(Debug, Default)]
pub struct TempArtifacts {
    paths: Vec<PathBuf>,
}

impl TempArtifacts {
    pub fn track(&mut self, path: PathBuf) {
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
    }

    /// Remove every tracked artifact. Missing ones are fine.
    pub async fn purge(&mut self) {
        for path in self.paths.drain(..) {
            let result = if path.is_dir() {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };
            log_removal(&path, result);
        }
    }
}

impl Drop for TempArtifacts {
    fn drop(&mut self) {
        for path in self.paths.drain(..) {
            let result = if path.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
            log_removal(&path, result);
        }
    }
}

fn log_removal(path: &Path, result: std::io::Result<()>) {
    match result {
        Ok(()) => debug!("Removed temp artifact {:?}", path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove temp artifact {:?}: {}", path, e),
    }
}

/// One execution of the install state machine for one component.
#[derive(Debug)]
pub struct PipelineRun {
    id: RunId,
    component: Component,
    destination: PathBuf,
    install_dir: PathBuf,
    title: String,
    state: PipelineState,
    /// Cancelled once the run fails; progress sampling stops on it.
    halt_progress: CancellationToken,
    artifacts: TempArtifacts,
}

impl PipelineRun {
    pub fn new(request: &InstallRequest) -> Self {
        Self {
            id: RunId::next(),
            component: request.component,
            destination: request.destination.clone(),
            install_dir: request.component.install_dir(&request.destination),
            title: request.title(),
            state: PipelineState::Created,
            halt_progress: CancellationToken::new(),
            artifacts: TempArtifacts::default(),
        }
    }

    pub fn id(&self) -> RunId {
        self.id
    }

    pub fn component(&self) -> Component {
        self.component
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn halt_progress_token(&self) -> &CancellationToken {
        &self.halt_progress
    }

    pub(crate) fn artifacts_mut(&mut self) -> &mut TempArtifacts {
        &mut self.artifacts
    }

    /// Temp file the archive is downloaded to.
    pub fn download_path(&self, temp_dir: &Path) -> PathBuf {
        temp_dir.join(format!("{}-{}.download", self.component.slug(), self.id))
    }

    /// Scratch directory for archives that are unpacked in two stages.
    pub fn staging_path(&self, temp_dir: &Path) -> PathBuf {
        temp_dir.join(format!("{}-{}-staging", self.component.slug(), self.id))
    }

    pub(crate) fn advance(&mut self, next: PipelineState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        debug!(run_id = %self.id, "{} -> {}", self.state, next);
        self.state = next;
    }

    pub(crate) fn halt_progress(&self) {
        self.halt_progress.cancel();
    }
}
