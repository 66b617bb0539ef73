pub mod tracker;

use serde::Serialize;

pub use tracker::{percentage, ProgressSample, ProgressTracker};

/// Transient notification forwarded to the UI boundary; never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub label: String,
    pub detail: String,
    pub percentage: u8,
    pub is_extraction_phase: bool,
}

impl ProgressEvent {
    pub fn download(label: impl Into<String>, sample: &ProgressSample) -> Self {
        let detail = if sample.total_known {
            format!(
                "Downloading {} / {}",
                human_bytes(sample.bytes_transferred),
                human_bytes(sample.total_bytes)
            )
        } else {
            format!("Downloading {}", human_bytes(sample.bytes_transferred))
        };
        Self {
            label: label.into(),
            detail,
            percentage: sample.percentage,
            is_extraction_phase: false,
        }
    }

    /// Extraction is reported at full completion of the download phase.
    pub fn extraction(label: impl Into<String>, entry: &str) -> Self {
        Self {
            label: label.into(),
            detail: format!("Extracting {entry}"),
            percentage: 100,
            is_extraction_phase: true,
        }
    }

    pub fn finished(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            detail: "Installation finished".to_string(),
            percentage: 100,
            is_extraction_phase: false,
        }
    }

    pub fn failed(label: impl Into<String>, cause: &str) -> Self {
        Self {
            label: label.into(),
            detail: format!("Installation failed: {cause}"),
            percentage: 100,
            is_extraction_phase: false,
        }
    }
}

fn human_bytes(bytes: u64) -> String {
    const MIB: f64 = 1024.0 * 1024.0;
    format!("{:.1} MiB", bytes as f64 / MIB)
}
