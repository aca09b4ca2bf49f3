//! Password-gated arm/disarm of the supervisor.
//!
//! Arm installs and registers the monitor and watchdog, locks the settings
//! file, snapshots every artifact into the backup directory and flags the
//! whole set immutable. Arming an armed home first clears the flags left by
//! the previous arm.
//! Disarm clears the flags, unregisters both loops and relaxes permissions so
//! the artifacts can be edited. Neither operation is transactional: a failing
//! step aborts the rest and leaves earlier steps in place, unless the caller
//! opts into best-effort rollback.

use anyhow::Context;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::artifact::{
    ArtifactId, ArtifactStore, BACKUP_DIR_MODE, CREDENTIAL_MODE, DESCRIPTOR_MODE,
};
use crate::artifact::{CONTROLLER_BIN, MONITOR_BIN, WATCHDOG_BIN};
use crate::credential::{CredentialError, CredentialGate};
use crate::fsutil::{install_executable, set_mode, write_atomic};
use crate::immutability::{ImmutabilityGuard, ImmutabilityPrimitive};
use crate::registration::{ServiceDescriptor, ServiceRegistry, Unregistration};
use crate::settings::{load_settings, RegistrationSettings};
use crate::snapshot::snapshot_all;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmStep {
    ReleaseProtection,
    TightenCredential,
    CreateBackupDir,
    InstallMonitor,
    RegisterMonitor,
    LockController,
    InstallWatchdog,
    LockSettings,
    SnapshotBackups,
    ProtectArtifacts,
}

impl fmt::Display for ArmStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArmStep::ReleaseProtection => "release protection",
            ArmStep::TightenCredential => "tighten credential",
            ArmStep::CreateBackupDir => "create backup directory",
            ArmStep::InstallMonitor => "install monitor",
            ArmStep::RegisterMonitor => "register monitor",
            ArmStep::LockController => "lock controller",
            ArmStep::InstallWatchdog => "install watchdog",
            ArmStep::LockSettings => "lock settings",
            ArmStep::SnapshotBackups => "snapshot backups",
            ArmStep::ProtectArtifacts => "protect artifacts",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisarmStep {
    ReleaseProtection,
    UnregisterLoops,
    RelaxPermissions,
}

impl fmt::Display for DisarmStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DisarmStep::ReleaseProtection => "release protection",
            DisarmStep::UnregisterLoops => "unregister loops",
            DisarmStep::RelaxPermissions => "relax permissions",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Auth(#[from] CredentialError),
    #[error("arm failed at step `{step}`: {cause:#}")]
    Arm {
        step: ArmStep,
        cause: anyhow::Error,
        /// Whether completed steps were undone.
        rolled_back: bool,
    },
    #[error("disarm failed at step `{step}`: {cause:#}")]
    Disarm { step: DisarmStep, cause: anyhow::Error },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ArmOptions {
    /// Undo completed steps on failure, best effort.
    pub rollback_on_failure: bool,
}

#[derive(Debug, Default)]
pub struct ArmReport {
    pub registered: Vec<String>,
    pub backed_up: usize,
    pub protected: usize,
}

#[derive(Debug, Default)]
pub struct DisarmReport {
    pub released: usize,
    pub unregistered: Vec<String>,
    pub already_absent: Vec<String>,
    pub relaxed: usize,
    pub missing: Vec<PathBuf>,
}

/// What a partially completed arm has changed so far.
#[derive(Debug, Default)]
struct ArmProgress {
    registered: Vec<(String, PathBuf)>,
    flagged: Vec<PathBuf>,
}

type StepResult<T> = Result<T, (ArmStep, anyhow::Error)>;

fn at(step: ArmStep) -> impl FnOnce(anyhow::Error) -> (ArmStep, anyhow::Error) {
    move |cause| (step, cause)
}

pub struct LifecycleController {
    store: ArtifactStore,
    labels: RegistrationSettings,
    gate: CredentialGate,
    registry: Arc<dyn ServiceRegistry>,
    flags: Arc<dyn ImmutabilityPrimitive>,
    install_dir: PathBuf,
}

impl LifecycleController {
    pub fn new(
        store: ArtifactStore,
        labels: RegistrationSettings,
        registry: Arc<dyn ServiceRegistry>,
        flags: Arc<dyn ImmutabilityPrimitive>,
        install_dir: PathBuf,
    ) -> Self {
        let gate = CredentialGate::new(store.credential_path());
        Self {
            store,
            labels,
            gate,
            registry,
            flags,
            install_dir,
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn arm(&self, secret: &str, options: ArmOptions) -> Result<ArmReport, LifecycleError> {
        self.gate.verify(secret)?;
        let mut progress = ArmProgress::default();
        match self.run_arm(&mut progress) {
            Ok(report) => {
                info!(
                    registered = report.registered.len(),
                    protected = report.protected,
                    "armed"
                );
                Ok(report)
            }
            Err((step, cause)) => {
                warn!(%step, error = %cause, "arm aborted");
                if options.rollback_on_failure {
                    self.roll_back(&progress);
                }
                Err(LifecycleError::Arm {
                    step,
                    cause,
                    rolled_back: options.rollback_on_failure,
                })
            }
        }
    }

    fn run_arm(&self, progress: &mut ArmProgress) -> StepResult<ArmReport> {
        let released = ImmutabilityGuard::new(self.flags.as_ref())
            .release(self.store.protected_paths().iter().map(PathBuf::as_path))
            .map_err(anyhow::Error::from)
            .map_err(at(ArmStep::ReleaseProtection))?;
        if released > 0 {
            info!(released, "re-arming; cleared flags from previous arm");
        }

        let credential = self.store.credential_path();
        set_mode(credential, CREDENTIAL_MODE)
            .with_context(|| format!("chmod {:o} on {}", CREDENTIAL_MODE, credential.display()))
            .map_err(at(ArmStep::TightenCredential))?;

        self.create_dirs().map_err(at(ArmStep::CreateBackupDir))?;

        self.install(ArtifactId::Monitor, MONITOR_BIN)
            .map_err(at(ArmStep::InstallMonitor))?;
        self.register_loop(ArtifactId::Monitor, progress)
            .map_err(at(ArmStep::RegisterMonitor))?;

        self.install(ArtifactId::Controller, CONTROLLER_BIN)
            .map_err(at(ArmStep::LockController))?;

        self.install(ArtifactId::Watchdog, WATCHDOG_BIN)
            .and_then(|()| self.register_loop(ArtifactId::Watchdog, progress))
            .map_err(at(ArmStep::InstallWatchdog))?;

        self.lock_settings().map_err(at(ArmStep::LockSettings))?;

        let manifest = snapshot_all(&self.store).map_err(at(ArmStep::SnapshotBackups))?;

        let paths = self.store.protected_paths();
        let guard = ImmutabilityGuard::new(self.flags.as_ref());
        for path in &paths {
            guard
                .protect([path.as_path()])
                .map_err(anyhow::Error::from)
                .map_err(at(ArmStep::ProtectArtifacts))?;
            progress.flagged.push(path.clone());
        }

        Ok(ArmReport {
            registered: progress.registered.iter().map(|(l, _)| l.clone()).collect(),
            backed_up: manifest.entries.len(),
            protected: progress.flagged.len(),
        })
    }

    fn create_dirs(&self) -> anyhow::Result<()> {
        let backup = self.store.backup_dir();
        std::fs::create_dir_all(backup)
            .with_context(|| format!("create {}", backup.display()))?;
        set_mode(backup, BACKUP_DIR_MODE)?;
        std::fs::create_dir_all(self.store.log_dir())?;
        Ok(())
    }

    /// Persist the effective settings (defaults when no file exists) so the
    /// loops restart with exactly what was armed.
    fn lock_settings(&self) -> anyhow::Result<()> {
        let artifact = self.store.get(ArtifactId::Settings);
        let settings = load_settings(self.store.home())
            .with_context(|| format!("parse {}", artifact.path.display()))?;
        let data = serde_json::to_vec_pretty(&settings)?;
        write_atomic(&artifact.path, &data, artifact.required_mode)
            .with_context(|| format!("write {}", artifact.path.display()))?;
        Ok(())
    }

    fn install(&self, id: ArtifactId, binary: &str) -> anyhow::Result<()> {
        let artifact = self.store.get(id);
        let source = self.install_dir.join(binary);
        install_executable(&source, &artifact.path, artifact.required_mode).with_context(|| {
            format!(
                "install {} -> {}",
                source.display(),
                artifact.path.display()
            )
        })?;
        info!(path = %artifact.path.display(), "executable installed");
        Ok(())
    }

    /// Write the descriptor for the loop installed as `program` and load it.
    fn register_loop(&self, program: ArtifactId, progress: &mut ArmProgress) -> anyhow::Result<()> {
        let (descriptor_id, label, log_stem) = match program {
            ArtifactId::Monitor => (
                ArtifactId::MonitorDescriptor,
                &self.labels.monitor_label,
                "monitor",
            ),
            _ => (
                ArtifactId::WatchdogDescriptor,
                &self.labels.watchdog_label,
                "watchdog",
            ),
        };
        let logs = self.store.log_dir();
        let descriptor = ServiceDescriptor::new(label.clone(), &self.store.get(program).path)
            .with_arguments(["--home".to_string(), self.store.home().display().to_string()])
            .with_log_paths(
                logs.join(format!("{log_stem}.out.log")),
                logs.join(format!("{log_stem}.err.log")),
            );
        let path = &self.store.get(descriptor_id).path;
        write_atomic(path, descriptor.to_plist().as_bytes(), DESCRIPTOR_MODE)
            .with_context(|| format!("write descriptor {}", path.display()))?;
        self.registry.register(label, path)?;
        progress.registered.push((label.clone(), path.clone()));
        Ok(())
    }

    fn roll_back(&self, progress: &ArmProgress) {
        for path in progress.flagged.iter().rev() {
            if let Err(e) = self.flags.clear_immutable(path) {
                warn!(path = %path.display(), error = %e, "rollback: clearing flag failed");
            }
        }
        for (label, path) in progress.registered.iter().rev() {
            if let Err(e) = self.registry.unregister(label, path) {
                warn!(label = %label, error = %e, "rollback: unregister failed");
            }
        }
        info!(
            flags = progress.flagged.len(),
            registrations = progress.registered.len(),
            "arm rolled back"
        );
    }

    pub fn disarm(&self, secret: &str) -> Result<DisarmReport, LifecycleError> {
        self.gate.verify(secret)?;
        let mut report = DisarmReport::default();

        let paths = self.release_candidates();
        report.released = ImmutabilityGuard::new(self.flags.as_ref())
            .release(paths.iter().map(PathBuf::as_path))
            .map_err(|e| LifecycleError::Disarm {
                step: DisarmStep::ReleaseProtection,
                cause: anyhow::Error::from(e),
            })?;

        let loops = [
            (&self.labels.monitor_label, ArtifactId::MonitorDescriptor),
            (&self.labels.watchdog_label, ArtifactId::WatchdogDescriptor),
        ];
        for (label, descriptor) in loops {
            let path = &self.store.get(descriptor).path;
            match self.registry.unregister(label, path) {
                Ok(Unregistration::Unloaded) => report.unregistered.push(label.clone()),
                Ok(Unregistration::AlreadyAbsent) => {
                    warn!(label = %label, "service was not registered");
                    report.already_absent.push(label.clone());
                }
                Err(e) => {
                    return Err(LifecycleError::Disarm {
                        step: DisarmStep::UnregisterLoops,
                        cause: anyhow::Error::from(e),
                    })
                }
            }
        }

        for artifact in self.store.artifacts() {
            if !artifact.path.exists() {
                warn!(path = %artifact.path.display(), "artifact missing; nothing to relax");
                report.missing.push(artifact.path.clone());
                continue;
            }
            let mode = artifact.relaxed_mode();
            set_mode(&artifact.path, mode)
                .with_context(|| format!("chmod {:o} on {}", mode, artifact.path.display()))
                .map_err(|cause| LifecycleError::Disarm {
                    step: DisarmStep::RelaxPermissions,
                    cause,
                })?;
            report.relaxed += 1;
        }

        info!(
            released = report.released,
            unregistered = report.unregistered.len(),
            "disarmed"
        );
        Ok(report)
    }

    /// Known artifacts plus every file found under the home and backup
    /// directories, hidden ones included.
    fn release_candidates(&self) -> BTreeSet<PathBuf> {
        let mut paths: BTreeSet<PathBuf> = self.store.protected_paths().into_iter().collect();
        for root in [self.store.home(), self.store.backup_dir()] {
            paths.extend(files_under(root));
        }
        paths
    }
}

fn files_under(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect()
}
