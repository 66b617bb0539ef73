use std::path::PathBuf;
use thiserror::Error;

use super::component::Component;
use super::pipeline::PipelineState;

/// Central error type for the installer backend.
/// Every module returns `Result<T, InstallError>`.
#[derive(Debug, Error)]
pub enum InstallError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Not enough disk space at {path:?}: available={available} required={required}")]
    InsufficientSpace {
        path: PathBuf,
        available: u64,
        required: u64,
    },

    #[error("Background task failed: {0}")]
    Task(String),

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed for {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },

    #[error("Transfer from {url} interrupted after {received} of {expected:?} bytes")]
    TransferInterrupted {
        url: String,
        received: u64,
        expected: Option<u64>,
    },

    // ── Archive ─────────────────────────────────────────
    #[error("Zip extraction error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("No first cabinet in {dir:?} (tried {tried:?})")]
    CabinetNotFound { dir: PathBuf, tried: Vec<String> },

    // ── Admission ───────────────────────────────────────
    #[error("{0} is already being installed")]
    AlreadyInstalling(Component),

    // ── Post-processing ─────────────────────────────────
    #[error("Post-processing step '{step}' failed: {message}")]
    PostProcess { step: String, message: String },

    #[error("{component} installation failed while {stage}: {source}")]
    Pipeline {
        component: Component,
        stage: PipelineState,
        #[source]
        source: Box<InstallError>,
    },

    // ── JSON ────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type InstallResult<T> = Result<T, InstallError>;

/// Coarse classification surfaced to callers and failure notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    Filesystem,
    Archive,
    AlreadyInstalling,
    PostProcess,
}

impl InstallError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            InstallError::Http(_)
            | InstallError::DownloadFailed { .. }
            | InstallError::TransferInterrupted { .. } => ErrorKind::Network,
            InstallError::Io { .. }
            | InstallError::InsufficientSpace { .. }
            | InstallError::Task(_)
            | InstallError::Json(_) => ErrorKind::Filesystem,
            InstallError::Zip(_)
            | InstallError::Archive(_)
            | InstallError::CabinetNotFound { .. } => ErrorKind::Archive,
            InstallError::AlreadyInstalling(_) => ErrorKind::AlreadyInstalling,
            InstallError::PostProcess { .. } => ErrorKind::PostProcess,
            InstallError::Pipeline { source, .. } => source.kind(),
        }
    }

    /// Pipeline stage the error was raised in, if it came out of a run.
    pub fn stage(&self) -> Option<PipelineState> {
        match self {
            InstallError::Pipeline { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        InstallError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn post_process(step: &str, message: impl Into<String>) -> Self {
        InstallError::PostProcess {
            step: step.to_string(),
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for InstallError {
    fn from(source: std::io::Error) -> Self {
        InstallError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

impl From<tokio::task::JoinError> for InstallError {
    fn from(err: tokio::task::JoinError) -> Self {
        InstallError::Task(err.to_string())
    }
}

// ── Serialization for UI IPC ────────────────────────────
// Frontends receive the error as its display string.
impl serde::Serialize for InstallError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        let network = InstallError::DownloadFailed {
            url: "http://x".into(),
            status: 404,
        };
        assert_eq!(network.kind(), ErrorKind::Network);

        let cabinet = InstallError::CabinetNotFound {
            dir: PathBuf::from("/tmp"),
            tried: vec!["data1.cab".into()],
        };
        assert_eq!(cabinet.kind(), ErrorKind::Archive);

        let busy = InstallError::AlreadyInstalling(Component::ContentPatch);
        assert_eq!(busy.kind(), ErrorKind::AlreadyInstalling);

        let io = InstallError::io("/nope", std::io::Error::other("denied"));
        assert_eq!(io.kind(), ErrorKind::Filesystem);
    }

    #[test]
    fn pipeline_errors_keep_the_cause_kind() {
        let err = InstallError::Pipeline {
            component: Component::PrimaryClient,
            stage: PipelineState::Extracting,
            source: Box::new(InstallError::Archive("bad header".into())),
        };
        assert_eq!(err.kind(), ErrorKind::Archive);
        assert_eq!(err.stage(), Some(PipelineState::Extracting));
        assert!(err.to_string().contains("while extracting"));
    }

    #[test]
    fn serializes_as_display_string() {
        let err = InstallError::post_process("register-install-path", "access denied");
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(
            json,
            "\"Post-processing step 'register-install-path' failed: access denied\""
        );
    }
}
