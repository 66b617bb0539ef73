use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::core::component::Component;
use crate::core::pipeline::RunId;
use crate::core::ports::{InstallNotifier, ProgressSink};

/// Progress row update as seen by a UI thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressItem {
    Update {
        run_id: RunId,
        title: String,
        subtitle: String,
        message: String,
        percentage: u8,
    },
    Stop {
        run_id: RunId,
    },
}

/// Forwards progress rows over a single-writer channel.
///
/// Sending never blocks; a closed receiver drops updates.
#[derive(Debug, Clone)]
pub struct ChannelProgressSink {
    tx: mpsc::UnboundedSender<ProgressItem>,
}

impl ChannelProgressSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressItem>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelProgressSink {
    fn add_progress_item(
        &self,
        run_id: RunId,
        title: &str,
        subtitle: &str,
        message: &str,
        percentage: u8,
    ) {
        let _ = self.tx.send(ProgressItem::Update {
            run_id,
            title: title.to_string(),
            subtitle: subtitle.to_string(),
            message: message.to_string(),
            percentage,
        });
    }

    fn stop_progress_item(&self, run_id: RunId) {
        let _ = self.tx.send(ProgressItem::Stop { run_id });
    }
}

/// Logs progress rows instead of drawing them.
#[derive(Debug, Clone, Default)]
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn add_progress_item(
        &self,
        run_id: RunId,
        title: &str,
        subtitle: &str,
        message: &str,
        percentage: u8,
    ) {
        info!(%run_id, "{} [{}] {}% {}", title, subtitle, percentage, message);
    }

    fn stop_progress_item(&self, run_id: RunId) {
        info!(%run_id, "progress closed");
    }
}

#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

impl InstallNotifier for TracingNotifier {
    fn notify_installed(&self, component: Component) {
        info!("{} installed", component);
    }

    fn notify_failed_install(&self, component: Component, error_detail: &str) {
        warn!("{} failed to install: {}", component, error_detail);
    }

    fn notify_already_installing(&self) {
        warn!("An installation of this component is already running");
    }
}
