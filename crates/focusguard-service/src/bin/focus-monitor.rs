//! Login-session loop that keeps Focus and FocusMe running.

use anyhow::{Context, Result};
use clap::Parser;
use focusguard_core::automation::OsaScript;
use focusguard_core::paths::home_dir;
use focusguard_core::settings::load_settings;
use focusguard_service::monitor::ProcessMonitor;
use focusguard_service::probe::SystemProbe;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "FocusGuard process monitor", long_about = None)]
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

    let automation = Arc::new(OsaScript);
    let monitor = ProcessMonitor::new(
        settings.monitor,
        SystemProbe::new(),
        automation.clone(),
        automation,
    );

    tokio::select! {
        _ = monitor.run() => {}
        _ = signal::ctrl_c() => info!("monitor interrupted; exiting"),
    }
    Ok(())
}
