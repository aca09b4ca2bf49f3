//! Fakes for the OS collaborators of the two loops.

#![allow(dead_code)]

use focusguard_core::artifact::{CONTROLLER_BIN, MONITOR_BIN, WATCHDOG_BIN};
use focusguard_core::automation::{AutomationBridge, AutomationError, Notifier};
use focusguard_core::immutability::ImmutabilityPrimitive;
use focusguard_core::registration::{RegistrationError, ServiceRegistry, Unregistration};
use focusguard_service::probe::ProcessProbe;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Probe whose answers are set per process name; unknown names are not running.
#[derive(Clone, Default)]
pub struct ScriptedProbe {
    pub running: Arc<Mutex<HashSet<String>>>,
    pub probes: Arc<AtomicUsize>,
}

impl ScriptedProbe {
    pub fn set_running(&self, name: &str, running: bool) {
        let mut set = self.running.lock();
        if running {
            set.insert(name.to_string());
        } else {
            set.remove(name);
        }
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

impl ProcessProbe for ScriptedProbe {
    fn is_running(&mut self, process_name: &str) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.running.lock().contains(process_name)
    }
}

#[derive(Default)]
pub struct RecordingBridge {
    pub activations: Mutex<Vec<String>>,
    pub terminal_commands: Mutex<Vec<String>>,
}

impl RecordingBridge {
    pub fn launches(&self) -> usize {
        self.activations.lock().len() + self.terminal_commands.lock().len()
    }
}

impl AutomationBridge for RecordingBridge {
    fn activate_application(&self, name: &str) -> Result<(), AutomationError> {
        self.activations.lock().push(name.to_string());
        Ok(())
    }

    fn run_in_terminal(&self, command: &str) -> Result<(), AutomationError> {
        self.terminal_commands.lock().push(command.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, _title: &str, message: &str) -> Result<(), AutomationError> {
        self.messages.lock().push(message.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeRegistry {
    pub loaded: Mutex<BTreeMap<String, PathBuf>>,
    /// `"<verb> <label>"` for every call that changed or could change state.
    pub calls: Mutex<Vec<String>>,
}

impl FakeRegistry {
    pub fn labels(&self) -> Vec<String> {
        self.loaded.lock().keys().cloned().collect()
    }

    pub fn forget(&self, label: &str) {
        self.loaded.lock().remove(label);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

impl ServiceRegistry for FakeRegistry {
    fn register(&self, label: &str, descriptor: &Path) -> Result<(), RegistrationError> {
        if !descriptor.exists() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "descriptor missing").into());
        }
        self.calls.lock().push(format!("register {label}"));
        self.loaded
            .lock()
            .entry(label.to_string())
            .or_insert_with(|| descriptor.to_path_buf());
        Ok(())
    }

    fn unregister(
        &self,
        label: &str,
        _descriptor: &Path,
    ) -> Result<Unregistration, RegistrationError> {
        self.calls.lock().push(format!("unregister {label}"));
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
}

impl MemoryFlags {
    pub fn is_flagged(&self, path: &Path) -> bool {
        self.flagged.lock().contains(path)
    }
}

impl ImmutabilityPrimitive for MemoryFlags {
    fn set_immutable(&self, path: &Path) -> io::Result<()> {
        if !path.exists() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such file"));
        }
        self.flagged.lock().insert(path.to_path_buf());
        Ok(())
    }

    fn clear_immutable(&self, path: &Path) -> io::Result<()> {
        self.flagged.lock().remove(path);
        Ok(())
    }

    fn is_immutable(&self, path: &Path) -> io::Result<bool> {
        Ok(self.is_flagged(path))
    }
}

pub fn fake_install_dir(root: &Path) -> PathBuf {
    let dir = root.join("bin");
    std::fs::create_dir_all(&dir).unwrap();
    for name in [CONTROLLER_BIN, MONITOR_BIN, WATCHDOG_BIN] {
        std::fs::write(dir.join(name), format!("#!{name}")).unwrap();
    }
    dir
}
