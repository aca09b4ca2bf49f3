//! Login-session service registration (launchd user agents).

use std::ffi::OsStr;
use std::fmt::Write as _;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRestriction {
    /// Only load into an interactive graphical login session.
    InteractiveGraphicalOnly,
}

impl SessionRestriction {
    fn launchd_session_type(self) -> &'static str {
        match self {
            SessionRestriction::InteractiveGraphicalOnly => "Aqua",
        }
    }
}

/// Declarative record telling the OS to run `program` at login and restart
/// it whenever it exits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub label: String,
    pub program: PathBuf,
    pub arguments: Vec<String>,
    pub run_at_load: bool,
    pub keep_alive: bool,
    pub session: SessionRestriction,
    pub stdout_path: Option<PathBuf>,
    pub stderr_path: Option<PathBuf>,
}

impl ServiceDescriptor {
    pub fn new(label: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            program: program.into(),
            arguments: Vec::new(),
            run_at_load: true,
            keep_alive: true,
            session: SessionRestriction::InteractiveGraphicalOnly,
            stdout_path: None,
            stderr_path: None,
        }
    }

    pub fn with_arguments<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_log_paths(mut self, stdout: PathBuf, stderr: PathBuf) -> Self {
        self.stdout_path = Some(stdout);
        self.stderr_path = Some(stderr);
        self
    }

    /// Render as a launchd property list.
    pub fn to_plist(&self) -> String {
        let mut out = String::new();
        out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        out.push_str(
            "<!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" \
             \"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n",
        );
        out.push_str("<plist version=\"1.0\">\n<dict>\n");
        push_string(&mut out, "Label", &self.label);
        out.push_str("\t<key>ProgramArguments</key>\n\t<array>\n");
        let program = self.program.display().to_string();
        for arg in std::iter::once(&program).chain(self.arguments.iter()) {
            let _ = writeln!(out, "\t\t<string>{}</string>", xml_escape(arg));
        }
        out.push_str("\t</array>\n");
        push_bool(&mut out, "RunAtLoad", self.run_at_load);
        push_bool(&mut out, "KeepAlive", self.keep_alive);
        push_string(
            &mut out,
            "LimitLoadToSessionType",
            self.session.launchd_session_type(),
        );
        if let Some(path) = &self.stdout_path {
            push_string(&mut out, "StandardOutPath", &path.display().to_string());
        }
        if let Some(path) = &self.stderr_path {
            push_string(&mut out, "StandardErrorPath", &path.display().to_string());
        }
        out.push_str("</dict>\n</plist>\n");
        out
    }
}

fn push_string(out: &mut String, key: &str, value: &str) {
    let _ = writeln!(out, "\t<key>{key}</key>\n\t<string>{}</string>", xml_escape(value));
}

fn push_bool(out: &mut String, key: &str, value: bool) {
    let _ = writeln!(out, "\t<key>{key}</key>\n\t<{value}/>");
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unregistration {
    Unloaded,
    /// Nothing was loaded under the label.
    AlreadyAbsent,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("`launchctl {verb}` failed for {label}: {stderr}")]
    CommandFailed {
        verb: String,
        label: String,
        stderr: String,
    },
    #[error("registration io: {0}")]
    Io(#[from] io::Error),
}

pub trait ServiceRegistry: Send + Sync {
    /// Load the descriptor at `descriptor` so the service starts now and on
    /// every future login. A job already loaded under `label` keeps running
    /// untouched; the caller may be that job.
    fn register(&self, label: &str, descriptor: &Path) -> Result<(), RegistrationError>;
    fn unregister(&self, label: &str, descriptor: &Path)
        -> Result<Unregistration, RegistrationError>;
    fn is_registered(&self, label: &str) -> Result<bool, RegistrationError>;
}

/// [`ServiceRegistry`] backed by `launchctl`.
#[derive(Debug, Clone)]
pub struct Launchctl {
    program: PathBuf,
}

impl Default for Launchctl {
    fn default() -> Self {
        Self {
            program: PathBuf::from("launchctl"),
        }
    }
}

impl Launchctl {
    fn run(&self, verb: &str, label: &str, args: &[&OsStr]) -> Result<(), RegistrationError> {
        let output = Command::new(&self.program).arg(verb).args(args).output()?;
        if !output.status.success() {
            return Err(RegistrationError::CommandFailed {
                verb: verb.to_string(),
                label: label.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

impl ServiceRegistry for Launchctl {
    fn register(&self, label: &str, descriptor: &Path) -> Result<(), RegistrationError> {
        if self.is_registered(label)? {
            debug!(label, "service already loaded; leaving it running");
            return Ok(());
        }
        self.run("load", label, &["-w".as_ref(), descriptor.as_os_str()])?;
        info!(label, descriptor = %descriptor.display(), "service registered");
        Ok(())
    }

    fn unregister(
        &self,
        label: &str,
        descriptor: &Path,
    ) -> Result<Unregistration, RegistrationError> {
        if !self.is_registered(label)? {
            return Ok(Unregistration::AlreadyAbsent);
        }
        if descriptor.exists() {
            self.run("unload", label, &["-w".as_ref(), descriptor.as_os_str()])?;
        } else {
            self.run("remove", label, &[label.as_ref()])?;
        }
        info!(label, "service unregistered");
        Ok(Unregistration::Unloaded)
    }

    fn is_registered(&self, label: &str) -> Result<bool, RegistrationError> {
        let output = Command::new(&self.program).arg("list").arg(label).output()?;
        Ok(output.status.success())
    }
}
