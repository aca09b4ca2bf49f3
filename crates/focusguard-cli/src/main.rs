use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use focusguard_core::artifact::ArtifactStore;
use focusguard_core::credential::CredentialGate;
use focusguard_core::immutability::FileFlags;
use focusguard_core::lifecycle::{ArmOptions, LifecycleController};
use focusguard_core::paths::{home_dir, install_dir};
use focusguard_core::registration::Launchctl;
use focusguard_core::settings::{load_settings, Settings};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

const PASSWORD_ENV: &str = "FOCUSGUARD_PASSWORD";
const PASSWORD_CONFIRM_ENV: &str = "FOCUSGUARD_PASSWORD_CONFIRM";

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "FocusGuard controller",
    long_about = "Without a command, sets up the guard password. `start` arms the guard, `stop` disarms it."
)]
struct Cli {
    /// Guard home directory
    #[arg(long, global = true)]
    home: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Install, register and lock down the guard loops
    Start {
        /// Undo completed steps if a later step fails
        #[arg(long)]
        rollback_on_failure: bool,
    },
    /// Unlock and unregister the guard loops
    Stop,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    let home = match cli.home {
        Some(home) => home,
        None => home_dir()?,
    };
    std::fs::create_dir_all(&home)
        .with_context(|| format!("create guard home {}", home.display()))?;
    let settings = load_settings(&home)?;
    match cli.command {
        None => setup_command(&home, &settings),
        Some(Commands::Start {
            rollback_on_failure,
        }) => start_command(home, settings, rollback_on_failure),
        Some(Commands::Stop) => stop_command(home, settings),
    }
}

fn setup_command(home: &std::path::Path, settings: &Settings) -> Result<()> {
    let store = ArtifactStore::new(home, &settings.registration);
    let gate = CredentialGate::new(store.credential_path());
    if gate.exists() {
        bail!(
            "password already set at {}; run `focusguard stop` to disarm",
            gate.path().display()
        );
    }
    let (password, confirmation) = prompt_password_twice("Create FocusGuard password: ")?;
    gate.initialize(&password, &confirmation)?;
    info!(path = %gate.path().display(), "credential stored");
    println!("Password set. Run `focusguard start` to arm the guard.");
    Ok(())
}

fn start_command(home: PathBuf, settings: Settings, rollback_on_failure: bool) -> Result<()> {
    let controller = controller(home, settings)?;
    let password = prompt_password_once("FocusGuard password: ")?;
    let report = controller.arm(
        &password,
        ArmOptions {
            rollback_on_failure,
        },
    )?;
    println!("FocusGuard armed.");
    println!("  registered: {}", report.registered.join(", "));
    println!("  backed up:  {} artifacts", report.backed_up);
    println!("  protected:  {} files", report.protected);
    Ok(())
}

fn stop_command(home: PathBuf, settings: Settings) -> Result<()> {
    let controller = controller(home, settings)?;
    let password = prompt_password_once("FocusGuard password: ")?;
    let report = controller.disarm(&password)?;
    println!("FocusGuard disarmed.");
    println!("  released:     {} files", report.released);
    println!("  unregistered: {}", report.unregistered.join(", "));
    if !report.already_absent.is_empty() {
        println!("  not loaded:   {}", report.already_absent.join(", "));
    }
    println!("  relaxed:      {} artifacts", report.relaxed);
    for path in &report.missing {
        println!("  missing:      {}", path.display());
    }
    Ok(())
}

fn controller(home: PathBuf, settings: Settings) -> Result<LifecycleController> {
    let store = ArtifactStore::new(home, &settings.registration);
    Ok(LifecycleController::new(
        store,
        settings.registration,
        Arc::new(Launchctl::default()),
        Arc::new(FileFlags),
        install_dir()?,
    ))
}

fn prompt_password_once(prompt: &str) -> Result<Zeroizing<String>> {
    if let Ok(pw) = std::env::var(PASSWORD_ENV) {
        if !pw.is_empty() {
            return Ok(Zeroizing::new(pw));
        }
    }
    let pw = rpassword::prompt_password(prompt).map_err(|e| anyhow!("password prompt: {e}"))?;
    Ok(Zeroizing::new(pw))
}

/// The two entries are returned unchecked; the credential gate compares them.
/// Non-interactive setup needs both variables.
fn prompt_password_twice(prompt: &str) -> Result<(Zeroizing<String>, Zeroizing<String>)> {
    if let Ok(pw) = std::env::var(PASSWORD_ENV) {
        if !pw.is_empty() {
            let confirm = std::env::var(PASSWORD_CONFIRM_ENV).map_err(|_| {
                anyhow!("{PASSWORD_CONFIRM_ENV} must be set together with {PASSWORD_ENV}")
            })?;
            return Ok((Zeroizing::new(pw), Zeroizing::new(confirm)));
        }
    }
    let first = prompt_password_once(prompt)?;
    let second = rpassword::prompt_password("Confirm password: ")
        .map_err(|e| anyhow!("password prompt: {e}"))?;
    Ok((first, Zeroizing::new(second)))
}
