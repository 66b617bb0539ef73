//! Loopback HTTP server and archive builders shared by the async tests.

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use super::component::Component;
use super::config::{ComponentSource, InstallerConfig};
use super::downloader::Downloader;
use super::error::{InstallError, InstallResult};
use super::extract::Extractor;
use super::http::build_http_client;
use super::pipeline::{PipelineContext, RunId};
use super::ports::{
    InstallNotifier, InstalledStateStore, PlatformIntegration, ProgressSink, ReleaseInfo,
    ReleaseLookup,
};

#[derive(Debug, Clone)]
pub enum Route {
    Body(Vec<u8>),
    /// Declares `declared` bytes, sends `body`, then closes the connection.
    Truncated { body: Vec<u8>, declared: usize },
    Status(u16),
    WithoutLength(Vec<u8>),
    /// Waits `delay` before answering with `body`.
    Delayed { delay: Duration, body: Vec<u8> },
    /// Declares `declared` bytes, sends `body`, then keeps the connection idle.
    Stalled { body: Vec<u8>, declared: usize },
}

impl Route {
    pub fn body(body: Vec<u8>) -> Self {
        Route::Body(body)
    }

    pub fn truncated(body: Vec<u8>, declared: usize) -> Self {
        Route::Truncated { body, declared }
    }

    pub fn status(code: u16) -> Self {
        Route::Status(code)
    }

    pub fn without_length(body: Vec<u8>) -> Self {
        Route::WithoutLength(body)
    }

    pub fn delayed(delay: Duration, body: Vec<u8>) -> Self {
        Route::Delayed { delay, body }
    }

    pub fn stalled(body: Vec<u8>, declared: usize) -> Self {
        Route::Stalled { body, declared }
    }
}

pub struct TestServer {
    addr: SocketAddr,
    task: JoinHandle<()>,
}

impl TestServer {
    pub async fn start(routes: Vec<(&str, Route)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let routes: Arc<HashMap<String, Route>> = Arc::new(
            routes
                .into_iter()
                .map(|(path, route)| (path.to_string(), route))
                .collect(),
        );

        let task = tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    return;
                };
                let routes = Arc::clone(&routes);
                tokio::spawn(async move {
                    let _ = serve(socket, &routes).await;
                });
            }
        });

        Self { addr, task }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(mut socket: TcpStream, routes: &HashMap<String, Route>) -> std::io::Result<()> {
    let mut request = Vec::new();
    let mut buf = [0_u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        request.extend_from_slice(&buf[..n]);
    }

    let head = String::from_utf8_lossy(&request);
    let path = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();

    match routes.get(&path).cloned().unwrap_or(Route::Status(404)) {
        Route::Body(body) => {
            let header = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            socket.write_all(header.as_bytes()).await?;
            socket.write_all(&body).await?;
        }
        Route::Truncated { body, declared } => {
            let header = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {declared}\r\nConnection: close\r\n\r\n"
            );
            socket.write_all(header.as_bytes()).await?;
            socket.write_all(&body).await?;
            socket.flush().await?;
        }
        Route::Status(code) => {
            let header =
                format!("HTTP/1.1 {code} Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
            socket.write_all(header.as_bytes()).await?;
        }
        Route::Delayed { delay, body } => {
            tokio::time::sleep(delay).await;
            let header = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            socket.write_all(header.as_bytes()).await?;
            socket.write_all(&body).await?;
        }
        Route::Stalled { body, declared } => {
            let header = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {declared}\r\nConnection: close\r\n\r\n"
            );
            socket.write_all(header.as_bytes()).await?;
            socket.write_all(&body).await?;
            socket.flush().await?;
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        Route::WithoutLength(body) => {
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n")
                .await?;
            socket.write_all(&body).await?;
        }
    }
    socket.shutdown().await
}

/// Build an in-memory zip archive. Names ending in `/` become directories.
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for (name, content) in entries {
        if name.ends_with('/') {
            writer.add_directory(*name, options).unwrap();
        } else {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content).unwrap();
        }
    }
    writer.finish().unwrap().into_inner()
}

/// Build an in-memory, uncompressed cabinet.
pub fn cab_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = cab::CabinetBuilder::new();
    {
        let folder = builder.add_folder(cab::CompressionType::None);
        for (name, _) in files {
            folder.add_file(*name);
        }
    }
    let mut writer = builder.build(Cursor::new(Vec::new())).unwrap();
    let mut index = 0;
    while let Some(mut file_writer) = writer.next_file().unwrap() {
        file_writer.write_all(files[index].1).unwrap();
        index += 1;
    }
    writer.finish().unwrap().into_inner()
}

// ─── Recording ports ───

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressRecord {
    pub run_id: RunId,
    pub title: String,
    pub message: String,
    pub percentage: u8,
}

/// Every boundary the pipeline talks to, recording what it was told.
#[derive(Default)]
pub struct RecordingPorts {
    deny_platform: bool,
    progress: Mutex<Vec<ProgressRecord>>,
    stops: Mutex<Vec<RunId>>,
    installed: Mutex<Vec<Component>>,
    failed: Mutex<Vec<(Component, String)>>,
    already_installing: Mutex<usize>,
    versions: Mutex<Vec<(Component, String)>>,
    locations: Mutex<Vec<(Component, PathBuf)>>,
    shortcuts: Mutex<Vec<PathBuf>>,
}

impl RecordingPorts {
    /// Make every platform call fail.
    pub fn deny_platform(mut self) -> Self {
        self.deny_platform = true;
        self
    }

    pub fn progress(&self) -> Vec<ProgressRecord> {
        self.progress.lock().unwrap().clone()
    }

    pub fn stops(&self) -> Vec<RunId> {
        self.stops.lock().unwrap().clone()
    }

    pub fn installed(&self) -> Vec<Component> {
        self.installed.lock().unwrap().clone()
    }

    pub fn failed(&self) -> Vec<(Component, String)> {
        self.failed.lock().unwrap().clone()
    }

    pub fn already_installing(&self) -> usize {
        *self.already_installing.lock().unwrap()
    }

    pub fn versions(&self) -> Vec<(Component, String)> {
        self.versions.lock().unwrap().clone()
    }

    pub fn locations(&self) -> Vec<(Component, PathBuf)> {
        self.locations.lock().unwrap().clone()
    }

    pub fn shortcuts(&self) -> Vec<PathBuf> {
        self.shortcuts.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingPorts {
    fn add_progress_item(
        &self,
        run_id: RunId,
        title: &str,
        _subtitle: &str,
        message: &str,
        percentage: u8,
    ) {
        self.progress.lock().unwrap().push(ProgressRecord {
            run_id,
            title: title.to_string(),
            message: message.to_string(),
            percentage,
        });
    }

    fn stop_progress_item(&self, run_id: RunId) {
        self.stops.lock().unwrap().push(run_id);
    }
}

impl InstallNotifier for RecordingPorts {
    fn notify_installed(&self, component: Component) {
        self.installed.lock().unwrap().push(component);
    }

    fn notify_failed_install(&self, component: Component, error_detail: &str) {
        self.failed
            .lock()
            .unwrap()
            .push((component, error_detail.to_string()));
    }

    fn notify_already_installing(&self) {
        *self.already_installing.lock().unwrap() += 1;
    }
}

#[async_trait]
impl InstalledStateStore for RecordingPorts {
    async fn record_installed_version(
        &self,
        component: Component,
        version: &str,
    ) -> InstallResult<()> {
        self.versions
            .lock()
            .unwrap()
            .push((component, version.to_string()));
        Ok(())
    }

    async fn record_installed(&self, component: Component, location: &Path) -> InstallResult<()> {
        self.locations
            .lock()
            .unwrap()
            .push((component, location.to_path_buf()));
        Ok(())
    }
}

#[async_trait]
impl PlatformIntegration for RecordingPorts {
    async fn register_install_path(
        &self,
        _component: Component,
        _path: &Path,
    ) -> InstallResult<()> {
        if self.deny_platform {
            return Err(InstallError::Io {
                path: PathBuf::from("HKCU/Software/Activision"),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied"),
            });
        }
        Ok(())
    }

    async fn create_shortcut(&self, _component: Component, target: &Path) -> InstallResult<()> {
        if self.deny_platform {
            return Err(InstallError::post_process("create-shortcut", "access denied"));
        }
        self.shortcuts.lock().unwrap().push(target.to_path_buf());
        Ok(())
    }
}

/// Release lookup answering from a fixed tag.
pub struct StaticReleases {
    tag: Option<String>,
}

impl StaticReleases {
    pub fn tagged(tag: &str) -> Self {
        Self {
            tag: Some(tag.to_string()),
        }
    }

    pub fn untagged() -> Self {
        Self { tag: None }
    }
}

#[async_trait]
impl ReleaseLookup for StaticReleases {
    async fn fetch_latest_release_info(&self, _component: Component) -> InstallResult<ReleaseInfo> {
        Ok(ReleaseInfo {
            tag_name: self.tag.clone(),
        })
    }
}

/// Config with every source pointed at `server` as `/<slug>.zip`, temp
/// files under `temp_root` and fast progress sampling.
pub fn test_config(server: &TestServer, temp_root: &Path) -> InstallerConfig {
    let mut config = InstallerConfig {
        data_dir: temp_root.join("data"),
        temp_dir: temp_root.join("tmp"),
        progress_interval_ms: 10,
        http_timeout_secs: 5,
        min_free_disk_margin_bytes: 0,
        ..InstallerConfig::default()
    };
    for component in Component::ALL {
        config.sources.insert(
            component,
            ComponentSource {
                url: server.url(&format!("/{}.zip", component.slug())),
                release_repo: None,
            },
        );
    }
    config
}

pub fn test_context(
    config: InstallerConfig,
    ports: &Arc<RecordingPorts>,
    releases: StaticReleases,
) -> PipelineContext {
    let client = build_http_client(Duration::from_secs(config.http_timeout_secs)).unwrap();
    PipelineContext {
        config: Arc::new(config),
        downloader: Downloader::new(client),
        extractor: Extractor::new(),
        progress: ports.clone(),
        notifier: ports.clone(),
        releases: Arc::new(releases),
        installed: ports.clone(),
        platform: ports.clone(),
    }
}
