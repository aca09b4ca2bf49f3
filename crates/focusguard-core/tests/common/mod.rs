//! In-memory stand-ins for the OS collaborators.

#![allow(dead_code)]

use focusguard_core::artifact::{CONTROLLER_BIN, MONITOR_BIN, WATCHDOG_BIN};
use focusguard_core::immutability::ImmutabilityPrimitive;
use focusguard_core::registration::{RegistrationError, ServiceRegistry, Unregistration};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
pub struct FakeRegistry {
    pub loaded: Mutex<BTreeMap<String, PathBuf>>,
    pub fail_unregister: AtomicBool,
}

impl FakeRegistry {
    pub fn labels(&self) -> Vec<String> {
        self.loaded.lock().keys().cloned().collect()
    }

    pub fn fail_unregister(&self) {
        self.fail_unregister.store(true, Ordering::SeqCst);
    }
}

impl ServiceRegistry for FakeRegistry {
    fn register(&self, label: &str, descriptor: &Path) -> Result<(), RegistrationError> {
        if !descriptor.exists() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "descriptor missing").into());
        }
        self.loaded
            .lock()
            .insert(label.to_string(), descriptor.to_path_buf());
        Ok(())
    }

    fn unregister(
        &self,
        label: &str,
        _descriptor: &Path,
    ) -> Result<Unregistration, RegistrationError> {
        if self.fail_unregister.load(Ordering::SeqCst) {
            return Err(RegistrationError::CommandFailed {
                verb: "unload".into(),
                label: label.into(),
                stderr: "Operation not permitted".into(),
            });
        }
        Ok(match self.loaded.lock().remove(label) {
            Some(_) => Unregistration::Unloaded,
            None => Unregistration::AlreadyAbsent,
        })
    }

    fn is_registered(&self, label: &str) -> Result<bool, RegistrationError> {
        Ok(self.loaded.lock().contains_key(label))
    }
}

#[derive(Default)]
pub struct MemoryFlags {
    pub flagged: Mutex<HashSet<PathBuf>>,
    pub deny: Mutex<Option<PathBuf>>,
    /// Every successful set (`true`) or clear (`false`), in call order.
    pub ops: Mutex<Vec<(bool, PathBuf)>>,
}

impl MemoryFlags {
    pub fn is_flagged(&self, path: &Path) -> bool {
        self.flagged.lock().contains(path)
    }

    pub fn count(&self) -> usize {
        self.flagged.lock().len()
    }

    pub fn deny(&self, path: PathBuf) {
        *self.deny.lock() = Some(path);
    }

    pub fn take_ops(&self) -> Vec<(bool, PathBuf)> {
        std::mem::take(&mut *self.ops.lock())
    }
}

impl ImmutabilityPrimitive for MemoryFlags {
    fn set_immutable(&self, path: &Path) -> io::Result<()> {
        if !path.exists() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such file"));
        }
        if self.deny.lock().as_deref() == Some(path) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        }
        self.flagged.lock().insert(path.to_path_buf());
        self.ops.lock().push((true, path.to_path_buf()));
        Ok(())
    }

    fn clear_immutable(&self, path: &Path) -> io::Result<()> {
        self.flagged.lock().remove(path);
        self.ops.lock().push((false, path.to_path_buf()));
        Ok(())
    }

    fn is_immutable(&self, path: &Path) -> io::Result<bool> {
        Ok(self.is_flagged(path))
    }
}

/// A directory holding stand-ins for the three built executables.
pub fn fake_install_dir(root: &Path) -> PathBuf {
    let dir = root.join("bin");
    std::fs::create_dir_all(&dir).unwrap();
    for name in [CONTROLLER_BIN, MONITOR_BIN, WATCHDOG_BIN] {
        std::fs::write(dir.join(name), format!("#!{name}")).unwrap();
    }
    dir
}
