//! The managed artifact set and its backup mirror.

use std::path::{Path, PathBuf};

use crate::paths::log_dir;
use crate::settings::{RegistrationSettings, SETTINGS_FILE};

pub const CONTROLLER_BIN: &str = "focusguard";
pub const MONITOR_BIN: &str = "focus-monitor";
pub const WATCHDOG_BIN: &str = "focus-watchdog";
pub const CREDENTIAL_FILE: &str = "credential";
pub const BACKUP_DIR: &str = ".backup";

/// Exec-only for the owner; reads are denied until the system is disarmed.
pub const LOCKED_EXEC_MODE: u32 = 0o100;
pub const CREDENTIAL_MODE: u32 = 0o400;
pub const DESCRIPTOR_MODE: u32 = 0o444;
pub const SETTINGS_MODE: u32 = 0o444;
/// Every backup carries this mode regardless of its primary.
pub const BACKUP_MODE: u32 = 0o400;
pub const BACKUP_DIR_MODE: u32 = 0o700;
pub const RELAXED_EXEC_MODE: u32 = 0o755;
pub const RELAXED_DATA_MODE: u32 = 0o644;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Script,
    Credential,
    RegistrationDescriptor,
    /// `settings.json`; the loops read it at every start.
    Configuration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArtifactId {
    Controller,
    Monitor,
    Credential,
    MonitorDescriptor,
    WatchdogDescriptor,
    Watchdog,
    Settings,
}

impl ArtifactId {
    /// Fixed order in which the watchdog inspects the artifact set.
    pub const WATCH_ORDER: [ArtifactId; 7] = [
        ArtifactId::Controller,
        ArtifactId::Monitor,
        ArtifactId::Credential,
        ArtifactId::MonitorDescriptor,
        ArtifactId::WatchdogDescriptor,
        ArtifactId::Watchdog,
        ArtifactId::Settings,
    ];

    pub fn kind(self) -> ArtifactKind {
        match self {
            ArtifactId::Controller | ArtifactId::Monitor | ArtifactId::Watchdog => {
                ArtifactKind::Script
            }
            ArtifactId::Credential => ArtifactKind::Credential,
            ArtifactId::MonitorDescriptor | ArtifactId::WatchdogDescriptor => {
                ArtifactKind::RegistrationDescriptor
            }
            ArtifactId::Settings => ArtifactKind::Configuration,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Artifact {
    pub id: ArtifactId,
    pub name: String,
    pub path: PathBuf,
    pub backup_path: Option<PathBuf>,
    pub required_mode: u32,
    pub kind: ArtifactKind,
}

impl Artifact {
    /// Mode applied when the system is disarmed.
    pub fn relaxed_mode(&self) -> u32 {
        match self.kind {
            ArtifactKind::Script => RELAXED_EXEC_MODE,
            _ => RELAXED_DATA_MODE,
        }
    }
}

/// Paths of every managed file under a guard home directory. Backups mirror
/// their primaries by base name inside [`BACKUP_DIR`].
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    home: PathBuf,
    backup_dir: PathBuf,
    artifacts: Vec<Artifact>,
}

impl ArtifactStore {
    pub fn new(home: impl Into<PathBuf>, registration: &RegistrationSettings) -> Self {
        let home = home.into();
        let backup_dir = home.join(BACKUP_DIR);
        let artifacts = ArtifactId::WATCH_ORDER
            .iter()
            .map(|&id| {
                let (name, required_mode) = match id {
                    ArtifactId::Controller => (CONTROLLER_BIN.to_string(), LOCKED_EXEC_MODE),
                    ArtifactId::Monitor => (MONITOR_BIN.to_string(), LOCKED_EXEC_MODE),
                    ArtifactId::Watchdog => (WATCHDOG_BIN.to_string(), LOCKED_EXEC_MODE),
                    ArtifactId::Credential => (CREDENTIAL_FILE.to_string(), CREDENTIAL_MODE),
                    ArtifactId::MonitorDescriptor => {
                        (descriptor_name(&registration.monitor_label), DESCRIPTOR_MODE)
                    }
                    ArtifactId::WatchdogDescriptor => {
                        (descriptor_name(&registration.watchdog_label), DESCRIPTOR_MODE)
                    }
                    ArtifactId::Settings => (SETTINGS_FILE.to_string(), SETTINGS_MODE),
                };
                Artifact {
                    id,
                    path: home.join(&name),
                    backup_path: Some(backup_dir.join(&name)),
                    name,
                    required_mode,
                    kind: id.kind(),
                }
            })
            .collect();
        Self {
            home,
            backup_dir,
            artifacts,
        }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    pub fn log_dir(&self) -> PathBuf {
        log_dir(&self.home)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.backup_dir.join(crate::snapshot::MANIFEST_FILE)
    }

    /// All artifacts in watch order.
    pub fn artifacts(&self) -> &[Artifact] {
        &self.artifacts
    }

    pub fn get(&self, id: ArtifactId) -> &Artifact {
        // Declaration order of ArtifactId matches WATCH_ORDER.
        &self.artifacts[id as usize]
    }

    pub fn credential_path(&self) -> &Path {
        &self.get(ArtifactId::Credential).path
    }

    /// Every primary, every backup and the snapshot manifest.
    pub fn protected_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.artifacts.iter().map(|a| a.path.clone()).collect();
        paths.extend(self.artifacts.iter().filter_map(|a| a.backup_path.clone()));
        paths.push(self.manifest_path());
        paths
    }
}

pub fn descriptor_name(label: &str) -> String {
    format!("{label}.plist")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ArtifactStore {
        ArtifactStore::new("/guard", &RegistrationSettings::default())
    }

    #[test]
    fn artifacts_follow_watch_order() {
        let ids: Vec<_> = store().artifacts().iter().map(|a| a.id).collect();
        assert_eq!(ids, ArtifactId::WATCH_ORDER);
    }

    #[test]
    fn every_artifact_has_a_backup_by_base_name() {
        let store = store();
        for artifact in store.artifacts() {
            let backup = artifact.backup_path.as_ref().unwrap();
            assert_eq!(backup.parent().unwrap(), store.backup_dir());
            assert_eq!(backup.file_name(), artifact.path.file_name());
        }
    }

    #[test]
    fn descriptors_are_named_after_labels() {
        let store = store();
        let desc = store.get(ArtifactId::WatchdogDescriptor);
        assert_eq!(desc.path, PathBuf::from("/guard/com.focusguard.watchdog.plist"));
        assert_eq!(desc.kind, ArtifactKind::RegistrationDescriptor);
        assert_eq!(desc.required_mode, DESCRIPTOR_MODE);
    }

    #[test]
    fn relaxed_modes_split_scripts_from_data() {
        let store = store();
        assert_eq!(store.get(ArtifactId::Monitor).relaxed_mode(), 0o755);
        assert_eq!(store.get(ArtifactId::Credential).relaxed_mode(), 0o644);
        assert_eq!(store.get(ArtifactId::MonitorDescriptor).relaxed_mode(), 0o644);
        assert_eq!(store.get(ArtifactId::Settings).relaxed_mode(), 0o644);
    }

    #[test]
    fn protected_paths_cover_primaries_backups_and_manifest() {
        let store = store();
        let paths = store.protected_paths();
        assert_eq!(paths.len(), 15);
        assert!(paths.contains(&PathBuf::from("/guard/settings.json")));
        assert!(paths.contains(&PathBuf::from("/guard/.backup/settings.json")));
        assert!(paths.contains(&store.manifest_path()));
    }
}
