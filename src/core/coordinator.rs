// ─── Install Coordinator ───
// Admits at most one in-flight run per component. The mark is taken
// synchronously at admission and released when the run reaches a
// terminal state, whether it succeeded or not.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, instrument, warn};

use super::component::{Component, InstallRequest};
use super::error::{InstallError, InstallResult};
use super::pipeline::{InstallPipeline, InstallReport, PipelineContext, PipelineRun};

/// Components with a run in flight.
#[derive(Debug, Clone, Default)]
pub struct ActiveTaskSet {
    inner: Arc<Mutex<HashSet<Component>>>,
}

impl ActiveTaskSet {
    fn lock(&self) -> MutexGuard<'_, HashSet<Component>> {
        // A panic while holding the lock cannot leave the set half-updated.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Atomically mark `component`; `false` if it was already marked.
    pub fn try_mark(&self, component: Component) -> bool {
        self.lock().insert(component)
    }

    pub fn clear(&self, component: Component) {
        self.lock().remove(&component);
    }

    pub fn is_active(&self, component: Component) -> bool {
        self.lock().contains(&component)
    }

    pub fn active(&self) -> Vec<Component> {
        let mut active: Vec<_> = self.lock().iter().copied().collect();
        active.sort();
        active
    }
}

/// Holds a component's mark; clears it on drop.
#[derive(Debug)]
pub struct ActiveMarker {
    set: ActiveTaskSet,
    component: Component,
}

impl Drop for ActiveMarker {
    fn drop(&mut self) {
        self.set.clear(self.component);
    }
}

/// An admitted install that has not started yet.
///
/// Dropping it without calling [`Admission::run`] releases the mark.
pub struct Admission {
    pipeline: InstallPipeline,
    _marker: ActiveMarker,
}

impl Admission {
    pub fn run_info(&self) -> &PipelineRun {
        self.pipeline.run_info()
    }

    /// Run the pipeline to a terminal state, then release the mark.
    pub async fn run(self) -> InstallResult<InstallReport> {
        let Admission { pipeline, _marker } = self;
        let result = pipeline.execute().await;
        drop(_marker);
        result
    }

    /// Give the admission back without installing, e.g. when the user
    /// declines a confirmation.
    pub fn decline(self) {
        info!("Install of {} declined", self.pipeline.run_info().component());
    }
}

#[derive(Clone)]
pub struct InstallCoordinator {
    active: ActiveTaskSet,
    ctx: PipelineContext,
}

impl InstallCoordinator {
    pub fn new(ctx: PipelineContext) -> Self {
        Self {
            active: ActiveTaskSet::default(),
            ctx,
        }
    }

    pub fn active(&self) -> &ActiveTaskSet {
        &self.active
    }

    /// Reserve `request.component` for a new run.
    ///
    /// Fails with [`InstallError::AlreadyInstalling`] (after notifying the
    /// user) if the component already has a run in flight.
    #[instrument(skip(self, request), fields(component = %request.component))]
    pub fn admit(&self, request: InstallRequest) -> InstallResult<Admission> {
        let component = request.component;
        if !self.active.try_mark(component) {
            warn!("{} is already being installed", component);
            self.ctx.notifier.notify_already_installing();
            return Err(InstallError::AlreadyInstalling(component));
        }

        let marker = ActiveMarker {
            set: self.active.clone(),
            component,
        };
        let pipeline = InstallPipeline::new(self.ctx.clone(), request);
        Ok(Admission {
            pipeline,
            _marker: marker,
        })
    }

    /// Admit and run in one go.
    pub async fn install(&self, request: InstallRequest) -> InstallResult<InstallReport> {
        self.admit(request)?.run().await
    }

    /// Forcefully clear a component's mark.
    pub fn release(&self, component: Component) {
        self.active.clear(component);
    }
}
