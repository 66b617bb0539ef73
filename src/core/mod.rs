// ─── Installer Core ───
// Download, unpack and post-process launcher components.
//
// Architecture:
//   core/
//     component    — Installable components + install requests
//     config       — Persisted installer settings + component sources
//     downloader/  — Streaming HTTP transfers with shared progress state
//     progress/    — Periodic sampling of a transfer into UI events
//     extract/     — Zip archives + cabinet chains
//     pipeline/    — Per-run state machine and post-processing steps
//     coordinator  — One in-flight run per component
//     ports        — Boundaries: UI, notifications, releases, state, OS
//     adapters/    — Default implementations of the ports

pub mod adapters;
pub mod component;
pub mod config;
pub mod coordinator;
pub mod downloader;
pub mod error;
pub mod extract;
pub mod http;
pub mod pipeline;
pub mod ports;
pub mod progress;

#[cfg(test)]
pub(crate) mod test_support;
