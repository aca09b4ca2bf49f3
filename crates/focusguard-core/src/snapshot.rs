//! Backup snapshot of the armed artifact set.
//!
//! Arm copies every primary into the backup directory and records a manifest
//! of SHA-256 digests, so the watchdog can refuse to restore from a backup
//! that was altered after the snapshot.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use crate::artifact::{ArtifactStore, BACKUP_MODE};
use crate::fsutil::{copy_atomic, set_mode, write_atomic};

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("{0} is not recorded in the snapshot manifest")]
    NotRecorded(String),
    #[error("backup of {name} corrupted: expected {expected}, got {actual}")]
    Corrupted {
        name: String,
        expected: String,
        actual: String,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub sha256: String,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub created_at: DateTime<Utc>,
    pub entries: BTreeMap<String, SnapshotEntry>,
}

impl SnapshotManifest {
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
        Ok(Some(serde_json::from_slice(&data)?))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &data, BACKUP_MODE)
            .with_context(|| format!("write manifest {}", path.display()))?;
        Ok(())
    }

    /// Check the backup file of artifact `name` against the recorded digest.
    pub fn verify(&self, name: &str, backup: &Path) -> Result<(), SnapshotError> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| SnapshotError::NotRecorded(name.to_string()))?;
        let actual = sha256_file(backup)?;
        if actual != entry.sha256 {
            return Err(SnapshotError::Corrupted {
                name: name.to_string(),
                expected: entry.sha256.clone(),
                actual,
            });
        }
        Ok(())
    }
}

/// Copy every primary into the backup directory at [`BACKUP_MODE`] and write
/// the manifest describing the copies.
pub fn snapshot_all(store: &ArtifactStore) -> Result<SnapshotManifest> {
    let mut entries = BTreeMap::new();
    for artifact in store.artifacts() {
        let Some(backup) = artifact.backup_path.as_ref() else {
            continue;
        };
        copy_atomic(&artifact.path, backup).with_context(|| {
            format!(
                "back up {} -> {}",
                artifact.path.display(),
                backup.display()
            )
        })?;
        set_mode(backup, BACKUP_MODE)
            .with_context(|| format!("chmod {:o} on {}", BACKUP_MODE, backup.display()))?;
        let size = std::fs::metadata(backup)?.len();
        entries.insert(
            artifact.name.clone(),
            SnapshotEntry {
                sha256: sha256_file(backup)?,
                size,
            },
        );
    }
    let manifest = SnapshotManifest {
        created_at: Utc::now(),
        entries,
    };
    manifest.save(&store.manifest_path())?;
    Ok(manifest)
}

pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
