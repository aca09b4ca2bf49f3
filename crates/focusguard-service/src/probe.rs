use sysinfo::System;

/// Answers whether a process with a given name is alive.
pub trait ProcessProbe: Send {
    /// Called once per monitor tick before any lookup.
    fn refresh(&mut self) {}
    fn is_running(&mut self, process_name: &str) -> bool;
}

pub struct SystemProbe {
    system: System,
}

impl SystemProbe {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessProbe for SystemProbe {
    fn refresh(&mut self) {
        self.system.refresh_processes();
    }

    fn is_running(&mut self, process_name: &str) -> bool {
        self.system
            .processes_by_exact_name(process_name)
            .next()
            .is_some()
    }
}
