// ─── Install Pipeline ───
// One generic state machine shared by every component:
//   Created → Downloading → PreparingDestination → Extracting
//           → PostProcessing → Finalized
// with a fork to Failed from any non-terminal state.

pub mod context;
pub mod run;
pub mod steps;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{error, info, instrument, warn};

use crate::core::component::{Component, InstallRequest};
use crate::core::error::{InstallError, InstallResult};
use crate::core::extract::{ArchiveKind, ExtractedEntry};
use crate::core::ports::ProgressSink;
use crate::core::progress::{ProgressEvent, ProgressTracker};

pub use context::PipelineContext;
pub use run::{PipelineRun, PipelineState, RunId, TempArtifacts};
pub use steps::{steps_for, PostProcessStep, StepContext, StepOutcome};

/// Summary of a finalized run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub run_id: RunId,
    pub component: Component,
    pub install_dir: PathBuf,
    pub downloaded_bytes: u64,
    pub extracted_entries: usize,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowState {
    Unopened,
    Open,
    Closed,
}

struct RowInner {
    sink: Arc<dyn ProgressSink>,
    run_id: RunId,
    title: String,
    subtitle: String,
    state: Mutex<RowState>,
}

impl RowInner {
    fn state(&self) -> MutexGuard<'_, RowState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Updates only reach the sink while the row is open.
    fn emit(&self, event: &ProgressEvent) {
        let state = self.state();
        if *state != RowState::Open {
            return;
        }
        self.sink.add_progress_item(
            self.run_id,
            &self.title,
            &self.subtitle,
            &event.detail,
            event.percentage,
        );
    }
}

/// Handle given to the reporter tasks of a run.
#[derive(Clone)]
struct RowEmitter(Arc<RowInner>);

impl RowEmitter {
    fn emit(&self, event: &ProgressEvent) {
        self.0.emit(event);
    }

    fn title(&self) -> &str {
        &self.0.title
    }
}

/// The UI row of one run, owned by its pipeline. Once opened it is closed
/// exactly once, on drop at the latest.
struct ProgressRow {
    inner: Arc<RowInner>,
}

impl ProgressRow {
    fn new(sink: Arc<dyn ProgressSink>, run: &PipelineRun) -> Self {
        Self {
            inner: Arc::new(RowInner {
                sink,
                run_id: run.id(),
                title: run.title().to_string(),
                subtitle: run.install_dir().display().to_string(),
                state: Mutex::new(RowState::Unopened),
            }),
        }
    }

    fn open(&self) {
        let mut state = self.inner.state();
        if *state == RowState::Unopened {
            *state = RowState::Open;
        }
    }

    fn emit(&self, event: &ProgressEvent) {
        self.inner.emit(event);
    }

    fn emitter(&self) -> RowEmitter {
        RowEmitter(Arc::clone(&self.inner))
    }

    fn close(&self) {
        let mut state = self.inner.state();
        if *state == RowState::Open {
            *state = RowState::Closed;
            self.inner.sink.stop_progress_item(self.inner.run_id);
        }
    }
}

impl Drop for ProgressRow {
    fn drop(&mut self) {
        self.close();
    }
}

pub struct InstallPipeline {
    ctx: PipelineContext,
    run: PipelineRun,
    url: String,
    steps: Vec<Box<dyn PostProcessStep>>,
    row: ProgressRow,
}

impl InstallPipeline {
    pub fn new(ctx: PipelineContext, request: InstallRequest) -> Self {
        let run = PipelineRun::new(&request);
        let url = ctx.config.source(request.component).url;
        let row = ProgressRow::new(Arc::clone(&ctx.progress), &run);
        Self {
            steps: steps_for(request.component),
            ctx,
            run,
            url,
            row,
        }
    }

    /// Replace the component's default post-processing table.
    pub fn with_steps(mut self, steps: Vec<Box<dyn PostProcessStep>>) -> Self {
        self.steps = steps;
        self
    }

    pub fn run_info(&self) -> &PipelineRun {
        &self.run
    }

    /// Drive the run to `Finalized` or `Failed`.
    ///
    /// Temp artifacts are gone and the progress row is closed by the time
    /// this returns, whatever the outcome.
    #[instrument(skip(self), fields(run_id = %self.run.id(), component = %self.run.component()))]
    pub async fn execute(mut self) -> InstallResult<InstallReport> {
        info!("Installing {} into {:?}", self.run.component(), self.run.install_dir());
        self.row.open();
        match self.run_steps().await {
            Ok(report) => {
                self.finalize().await;
                Ok(report)
            }
            Err(source) => {
                let stage = self.run.state();
                self.fail(&source).await;
                Err(InstallError::Pipeline {
                    component: self.run.component(),
                    stage,
                    source: Box::new(source),
                })
            }
        }
    }

    async fn run_steps(&mut self) -> InstallResult<InstallReport> {
        self.run.advance(PipelineState::Downloading);
        let (archive, downloaded_bytes) = self.download().await?;

        self.run.advance(PipelineState::PreparingDestination);
        self.prepare_destination(downloaded_bytes).await?;

        self.run.advance(PipelineState::Extracting);
        let extracted_entries = self.extract(&archive).await?;

        self.run.advance(PipelineState::PostProcessing);
        let version = self.post_process().await?;

        Ok(InstallReport {
            run_id: self.run.id(),
            component: self.run.component(),
            install_dir: self.run.install_dir().to_path_buf(),
            downloaded_bytes,
            extracted_entries,
            version,
        })
    }

    async fn download(&mut self) -> InstallResult<(PathBuf, u64)> {
        let temp_dir = self.ctx.config.temp_dir.clone();
        let archive = self.run.download_path(&temp_dir);
        self.run.artifacts_mut().track(archive.clone());

        let handle = self.ctx.downloader.start(&self.url, &archive);
        let tracker = ProgressTracker::new(
            handle.state(),
            self.ctx.config.progress_interval(),
            self.run.component().nominal_download_bytes(),
        );

        // Stops with the transfer, when the run halts, or when this future
        // is dropped.
        let sampling = self.run.halt_progress_token().child_token();
        let samples = tracker.samples(sampling.clone());
        let _stop_sampling = sampling.clone().drop_guard();
        let row = self.row.emitter();
        let reporter = tokio::spawn(async move {
            tokio::pin!(samples);
            while let Some(sample) = samples.next().await {
                row.emit(&ProgressEvent::download(row.title(), &sample));
            }
        });

        let result = handle.finish().await;
        sampling.cancel();
        if let Err(e) = reporter.await {
            warn!("Progress reporter ended abnormally: {}", e);
        }

        let outcome = result?;
        info!(
            "Downloaded {} bytes in {:.1}s",
            outcome.bytes,
            outcome.elapsed.as_secs_f64()
        );
        Ok((outcome.path, outcome.bytes))
    }

    async fn prepare_destination(&mut self, archive_bytes: u64) -> InstallResult<()> {
        let install_dir = self.run.install_dir().to_path_buf();
        tokio::fs::create_dir_all(&install_dir)
            .await
            .map_err(|e| InstallError::io(&install_dir, e))?;

        let required = archive_bytes
            .saturating_mul(2)
            .saturating_add(self.ctx.config.min_free_disk_margin_bytes);
        ensure_free_space(&install_dir, required)
    }

    async fn extract(&mut self, archive: &Path) -> InstallResult<usize> {
        let (tx, mut rx) = mpsc::unbounded_channel::<ExtractedEntry>();
        let row = self.row.emitter();
        let forwarder = tokio::spawn(async move {
            while let Some(entry) = rx.recv().await {
                row.emit(&ProgressEvent::extraction(row.title(), &entry.name));
            }
        });

        let install_dir = self.run.install_dir().to_path_buf();
        let result = match self.run.component().archive_kind() {
            ArchiveKind::Zip => {
                self.ctx
                    .extractor
                    .extract(ArchiveKind::Zip, archive, &install_dir, tx)
                    .await
            }
            ArchiveKind::CabinetChain => self.extract_cabinet_bundle(archive, &install_dir, tx).await,
        };

        // Every entry notification lands before the step's outcome is reported.
        if let Err(e) = forwarder.await {
            warn!("Extraction progress forwarder ended abnormally: {}", e);
        }
        result
    }

    /// The cabinet chain ships zipped: unpack it into a staging directory,
    /// then expand the chain into the install directory.
    async fn extract_cabinet_bundle(
        &mut self,
        bundle: &Path,
        install_dir: &Path,
        entries: mpsc::UnboundedSender<ExtractedEntry>,
    ) -> InstallResult<usize> {
        let staging = self.run.staging_path(&self.ctx.config.temp_dir);
        self.run.artifacts_mut().track(staging.clone());
        tokio::fs::create_dir_all(&staging)
            .await
            .map_err(|e| InstallError::io(&staging, e))?;

        // Bundle members are staging files, not installed ones.
        let (unused_tx, _unused_rx) = mpsc::unbounded_channel();
        self.ctx
            .extractor
            .extract(ArchiveKind::Zip, bundle, &staging, unused_tx)
            .await?;

        self.ctx
            .extractor
            .extract(ArchiveKind::CabinetChain, &staging, install_dir, entries)
            .await
    }

    async fn post_process(&mut self) -> InstallResult<Option<String>> {
        let ctx = StepContext {
            run_id: self.run.id(),
            component: self.run.component(),
            destination: self.run.destination(),
            install_dir: self.run.install_dir(),
            releases: self.ctx.releases.as_ref(),
            installed: self.ctx.installed.as_ref(),
            platform: self.ctx.platform.as_ref(),
        };

        let mut version = None;
        for step in &self.steps {
            info!("Post-processing: {}", step.name());
            if let StepOutcome::Versioned(tag) = step.run(&ctx).await? {
                version = Some(tag);
            }
        }
        Ok(version)
    }

    async fn finalize(&mut self) {
        self.run.advance(PipelineState::Finalized);
        self.row.emit(&ProgressEvent::finished(self.run.title()));
        self.run.artifacts_mut().purge().await;

        if let Err(e) = self
            .ctx
            .installed
            .record_installed(self.run.component(), self.run.install_dir())
            .await
        {
            warn!("Could not record installed state: {}", e);
        }

        self.ctx.notifier.notify_installed(self.run.component());
        self.row.close();
        info!("{} installed", self.run.component());
    }

    async fn fail(&mut self, source: &InstallError) {
        self.run.halt_progress();
        let stage = self.run.state();
        self.run.advance(PipelineState::Failed);
        self.run.artifacts_mut().purge().await;

        let cause = source.to_string();
        error!("{} failed while {}: {}", self.run.component(), stage, cause);
        self.row
            .emit(&ProgressEvent::failed(self.run.title(), &cause));
        self.ctx
            .notifier
            .notify_failed_install(self.run.component(), &cause);
        self.row.close();
    }
}

fn ensure_free_space(path: &Path, required: u64) -> InstallResult<()> {
    require_space(path, available_space(path), required)
}

/// Free space on the volume holding `path`, if that volume can be found.
fn available_space(path: &Path) -> Option<u64> {
    let disks = sysinfo::Disks::new_with_refreshed_list();
    let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    disks
        .list()
        .iter()
        .filter(|disk| canonical.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(|disk| disk.available_space())
}

/// An unknown volume passes.
fn require_space(path: &Path, available: Option<u64>, required: u64) -> InstallResult<()> {
    match available {
        Some(available) if available < required => Err(InstallError::InsufficientSpace {
            path: path.to_path_buf(),
            available,
            required,
        }),
        _ => Ok(()),
    }
}
