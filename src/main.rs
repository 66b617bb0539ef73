use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::error;

use installer_lib::core::adapters::{
    ChannelProgressSink, GithubReleaseLookup, JsonInstalledStore, NoopPlatform, ProgressItem,
    TracingNotifier,
};
use installer_lib::core::config::default_data_dir;
use installer_lib::core::downloader::Downloader;
use installer_lib::core::extract::Extractor;
use installer_lib::core::http::build_http_client;
use installer_lib::{
    init_tracing, Component, InstallCoordinator, InstallError, InstallRequest, InstallerConfig,
    PipelineContext,
};

#[derive(Parser)]
#[clap(name = "launcher-installer")]
#[clap(about = "Install game client components")]
#[clap(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Settings directory (default: platform data dir)
    #[clap(long, global = true)]
    data_dir: Option<PathBuf>,
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download and install a component
    Install {
        /// client, patch, variant or launcher
        component: Component,
        /// Directory to install into
        #[clap(long)]
        dest: PathBuf,
        /// Label of the flow this install belongs to
        #[clap(long)]
        parent: Option<String>,
        /// Do not ask for confirmation
        #[clap(long, short)]
        yes: bool,
    },
    /// Show recorded installs
    Status,
    /// Check whether a component is present in a directory
    Probe {
        component: Component,
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let data_dir = cli.data_dir.unwrap_or_else(default_data_dir);
    let config = InstallerConfig::load_or_default(&data_dir);

    let result = match cli.command {
        Commands::Install {
            component,
            dest,
            parent,
            yes,
        } => install(config, component, dest, parent, yes).await,
        Commands::Status => status(&config).await,
        Commands::Probe { component, dir } => {
            let state = if component.is_installed_at(&dir) {
                "installed"
            } else {
                "not installed"
            };
            println!("{component}: {state} in {}", dir.display());
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn install(
    config: InstallerConfig,
    component: Component,
    dest: PathBuf,
    parent: Option<String>,
    yes: bool,
) -> Result<(), InstallError> {
    let client = build_http_client(config.http_timeout())?;
    let (progress, mut rows) = ChannelProgressSink::new();
    let ctx = PipelineContext {
        releases: Arc::new(GithubReleaseLookup::from_config(client.clone(), &config)),
        installed: Arc::new(JsonInstalledStore::new(config.installed_state_path())),
        downloader: Downloader::new(client),
        extractor: Extractor::new(),
        progress: Arc::new(progress),
        notifier: Arc::new(TracingNotifier),
        platform: Arc::new(NoopPlatform),
        config: Arc::new(config),
    };
    let coordinator = InstallCoordinator::new(ctx);

    let mut request = InstallRequest::new(component, &dest);
    if let Some(parent) = parent {
        request = request.with_parent_label(parent);
    }
    if component.is_installed_at(&dest) {
        println!("{} is already present in {}, reinstalling", component, dest.display());
    }

    let admission = coordinator.admit(request)?;
    if !yes && !confirm(&format!(
        "Install {} into {}?",
        admission.run_info().title(),
        admission.run_info().install_dir().display()
    ))? {
        admission.decline();
        return Ok(());
    }

    let printer = tokio::spawn(async move {
        while let Some(row) = rows.recv().await {
            match row {
                ProgressItem::Update {
                    title,
                    message,
                    percentage,
                    ..
                } => println!("[{percentage:>3}%] {title}: {message}"),
                ProgressItem::Stop { .. } => break,
            }
        }
    });

    let report = admission.run().await;
    // The row is closed by now, so the printer drains and exits.
    let _ = printer.await;
    let report = report?;

    match &report.version {
        Some(version) => println!("Installed {} {}", report.component, version),
        None => println!("Installed {}", report.component),
    }
    Ok(())
}

async fn status(config: &InstallerConfig) -> Result<(), InstallError> {
    let store = JsonInstalledStore::new(config.installed_state_path());
    let records = store.load().await?;
    for component in Component::ALL {
        match records.get(&component) {
            Some(record) => println!(
                "{:<24} {:<12} {}",
                component.display_name(),
                record.version.as_deref().unwrap_or("-"),
                record
                    .location
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "-".to_string())
            ),
            None => println!("{:<24} not installed", component.display_name()),
        }
    }
    Ok(())
}

fn confirm(question: &str) -> Result<bool, InstallError> {
    print!("{question} [y/N] ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
