//! Login-session loop that restores deleted guard artifacts from backup.

use anyhow::{Context, Result};
use clap::Parser;
use focusguard_core::artifact::ArtifactStore;
use focusguard_core::immutability::FileFlags;
use focusguard_core::paths::home_dir;
use focusguard_core::registration::Launchctl;
use focusguard_core::settings::load_settings;
use focusguard_service::watchdog::Watchdog;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "FocusGuard watchdog", long_about = None)]
struct Cli {
    /// Guard home holding settings and artifacts
    #[arg(long)]
    home: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();
    let home = match cli.home {
        Some(home) => home,
        None => home_dir()?,
    };
    let settings = load_settings(&home)
        .with_context(|| format!("load settings from {}", home.display()))?;

    let store = ArtifactStore::new(&home, &settings.registration);
    let watchdog = Watchdog::new(
        store,
        settings.registration,
        Arc::new(Launchctl::default()),
        Arc::new(FileFlags),
        settings.watchdog.period(),
    );

    tokio::select! {
        _ = watchdog.run() => {}
        _ = signal::ctrl_c() => info!("watchdog interrupted; exiting"),
    }
    Ok(())
}
