pub mod installed;
pub mod platform;
pub mod release;
pub mod ui;

pub use installed::{InstalledRecord, JsonInstalledStore};
pub use platform::NoopPlatform;
pub use release::GithubReleaseLookup;
pub use ui::{ChannelProgressSink, ProgressItem, TracingNotifier, TracingProgressSink};
