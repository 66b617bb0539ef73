pub mod client;
pub mod state;

pub use client::{DownloadHandle, DownloadOutcome, Downloader};
pub use state::{TransferSnapshot, TransferState};
