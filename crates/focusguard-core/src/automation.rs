//! Desktop automation bridge and user notifications, driven through
//! `osascript`.

use std::io;
use std::process::Command;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum AutomationError {
    #[error("osascript failed: {0}")]
    ScriptFailed(String),
    #[error("automation io: {0}")]
    Io(#[from] io::Error),
}

pub trait AutomationBridge: Send + Sync {
    /// Bring the application named `name` to the foreground by simulated input.
    fn activate_application(&self, name: &str) -> Result<(), AutomationError>;
    /// Run `command` inside a new interactive terminal session.
    fn run_in_terminal(&self, command: &str) -> Result<(), AutomationError>;
}

pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, message: &str) -> Result<(), AutomationError>;
}

#[derive(Debug, Clone, Default)]
pub struct OsaScript;

impl OsaScript {
    fn run(&self, script: &str) -> Result<(), AutomationError> {
        debug!(script, "running osascript");
        let output = Command::new("osascript").args(["-e", script]).output()?;
        if !output.status.success() {
            return Err(AutomationError::ScriptFailed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(())
    }
}

impl AutomationBridge for OsaScript {
    fn activate_application(&self, name: &str) -> Result<(), AutomationError> {
        self.run(&spotlight_script(name))
    }

    fn run_in_terminal(&self, command: &str) -> Result<(), AutomationError> {
        self.run(&format!(
            r#"tell application "Terminal" to do script "{}""#,
            applescript_escape(command)
        ))
    }
}

impl Notifier for OsaScript {
    fn notify(&self, title: &str, message: &str) -> Result<(), AutomationError> {
        self.run(&format!(
            r#"display notification "{}" with title "{}""#,
            applescript_escape(message),
            applescript_escape(title)
        ))
    }
}

/// Opens Spotlight, types the application name and confirms.
fn spotlight_script(name: &str) -> String {
    format!(
        "tell application \"System Events\"\n\
         \tkeystroke space using command down\n\
         \tdelay 0.5\n\
         \tkeystroke \"{}\"\n\
         \tdelay 0.5\n\
         \tkey code 36\n\
         end tell",
        applescript_escape(name)
    )
}

fn applescript_escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', " ")
}
