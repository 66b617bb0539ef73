pub mod core;

use tracing_subscriber::EnvFilter;

pub use crate::core::component::{Component, InstallRequest};
pub use crate::core::config::InstallerConfig;
pub use crate::core::coordinator::{Admission, InstallCoordinator};
pub use crate::core::error::{ErrorKind, InstallError, InstallResult};
pub use crate::core::pipeline::{InstallReport, PipelineContext};

/// Initialize structured logging. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,installer_lib=debug")),
        )
        .with_writer(std::io::stderr)
        .init();
}
