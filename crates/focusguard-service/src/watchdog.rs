//! Periodic artifact repair.
//!
//! Each sweep walks the artifact set in watch order and restores any primary
//! that has gone missing from its backup, re-applies the required mode,
//! re-registers restored descriptors and flags the file immutable again. A
//! failed repair is logged and the sweep moves on; the next sweep retries.
//!
//! The watchdog executable is one of the artifacts. Restoring it does not
//! reload the running process; only the next start (launchd `KeepAlive`)
//! runs the restored copy.

use focusguard_core::artifact::{Artifact, ArtifactId, ArtifactKind, ArtifactStore};
use focusguard_core::fsutil::{copy_atomic, set_mode};
use focusguard_core::immutability::ImmutabilityPrimitive;
use focusguard_core::registration::{RegistrationError, ServiceRegistry};
use focusguard_core::settings::RegistrationSettings;
use focusguard_core::snapshot::{SnapshotError, SnapshotManifest};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum RepairError {
    #[error("{0} has no backup")]
    NotBackedUp(String),
    #[error("backup missing at {0}")]
    BackupMissing(PathBuf),
    #[error(transparent)]
    BackupCorrupted(#[from] SnapshotError),
    #[error("copy {from} -> {to}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("chmod {mode:o} on {path}: {source}")]
    Permissions {
        path: PathBuf,
        mode: u32,
        #[source]
        source: io::Error,
    },
    #[error("re-register {label}: {source}")]
    Register {
        label: String,
        #[source]
        source: RegistrationError,
    },
}

#[derive(Debug, Default)]
pub struct SweepReport {
    pub restored: Vec<ArtifactId>,
    pub failed: Vec<(ArtifactId, String)>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.restored.is_empty() && self.failed.is_empty()
    }
}

pub struct Watchdog {
    store: ArtifactStore,
    labels: RegistrationSettings,
    registry: Arc<dyn ServiceRegistry>,
    flags: Arc<dyn ImmutabilityPrimitive>,
    period: Duration,
}

impl Watchdog {
    pub fn new(
        store: ArtifactStore,
        labels: RegistrationSettings,
        registry: Arc<dyn ServiceRegistry>,
        flags: Arc<dyn ImmutabilityPrimitive>,
        period: Duration,
    ) -> Self {
        Self {
            store,
            labels,
            registry,
            flags,
            period,
        }
    }

    pub fn sweep(&self) -> SweepReport {
        let manifest = match SnapshotManifest::load(&self.store.manifest_path()) {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!(error = %e, "snapshot manifest unreadable; restoring unverified");
                None
            }
        };
        let mut report = SweepReport::default();
        for artifact in self.store.artifacts() {
            if artifact.path.exists() {
                continue;
            }
            warn!(path = %artifact.path.display(), "artifact missing");
            match self.restore(artifact, manifest.as_ref()) {
                Ok(()) => {
                    info!(path = %artifact.path.display(), "artifact restored");
                    report.restored.push(artifact.id);
                }
                Err(e) => {
                    error!(path = %artifact.path.display(), error = %e, "repair failed");
                    report.failed.push((artifact.id, e.to_string()));
                }
            }
        }
        report
    }

    fn restore(
        &self,
        artifact: &Artifact,
        manifest: Option<&SnapshotManifest>,
    ) -> Result<(), RepairError> {
        let backup = artifact
            .backup_path
            .as_ref()
            .ok_or_else(|| RepairError::NotBackedUp(artifact.name.clone()))?;
        if !backup.exists() {
            return Err(RepairError::BackupMissing(backup.clone()));
        }
        match manifest {
            Some(manifest) => manifest.verify(&artifact.name, backup)?,
            None => warn!(path = %backup.display(), "no snapshot manifest; backup unverified"),
        }
        copy_atomic(backup, &artifact.path).map_err(|source| RepairError::Copy {
            from: backup.clone(),
            to: artifact.path.clone(),
            source,
        })?;
        set_mode(&artifact.path, artifact.required_mode).map_err(|source| {
            RepairError::Permissions {
                path: artifact.path.clone(),
                mode: artifact.required_mode,
                source,
            }
        })?;
        if artifact.kind == ArtifactKind::RegistrationDescriptor {
            let label = self.label_for(artifact.id);
            self.registry
                .register(label, &artifact.path)
                .map_err(|source| RepairError::Register {
                    label: label.to_string(),
                    source,
                })?;
        }
        if let Err(e) = self.flags.set_immutable(&artifact.path) {
            warn!(path = %artifact.path.display(), error = %e, "could not re-protect restored artifact");
        }
        Ok(())
    }

    fn label_for(&self, id: ArtifactId) -> &str {
        match id {
            ArtifactId::WatchdogDescriptor => &self.labels.watchdog_label,
            _ => &self.labels.monitor_label,
        }
    }

    /// Sweep now and then once per period, forever.
    pub async fn run(self) {
        info!(period_secs = self.period.as_secs(), "watchdog running");
        loop {
            let report = self.sweep();
            if !report.is_clean() {
                info!(
                    restored = report.restored.len(),
                    failed = report.failed.len(),
                    "watchdog sweep finished"
                );
            }
            tokio::time::sleep(self.period).await;
        }
    }
}
