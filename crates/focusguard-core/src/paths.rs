use directories::ProjectDirs;
use std::path::{Path, PathBuf};

pub const APP_QUALIFIER: &str = "com";
pub const APP_ORG: &str = "focusguard";
pub const APP_NAME: &str = "focusguard";

/// Overrides the guard home directory.
pub const HOME_ENV: &str = "FOCUSGUARD_HOME";
/// Overrides the directory the controller installs executables from.
pub const INSTALL_DIR_ENV: &str = "FOCUSGUARD_INSTALL_DIR";

pub fn home_dir() -> anyhow::Result<PathBuf> {
    if let Ok(override_path) = std::env::var(HOME_ENV) {
        if !override_path.is_empty() {
            return Ok(PathBuf::from(override_path));
        }
    }
    let dirs = ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME)
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(dirs.data_dir().to_path_buf())
}

pub fn log_dir(home: &Path) -> PathBuf {
    home.join("logs")
}

/// Directory holding the built `focusguard`, `focus-monitor` and
/// `focus-watchdog` executables.
pub fn install_dir() -> anyhow::Result<PathBuf> {
    if let Ok(override_path) = std::env::var(INSTALL_DIR_ENV) {
        if !override_path.is_empty() {
            return Ok(PathBuf::from(override_path));
        }
    }
    let exe = std::env::current_exe()?;
    Ok(exe
        .parent()
        .ok_or_else(|| anyhow::anyhow!("no parent for exe"))?
        .to_path_buf())
}
