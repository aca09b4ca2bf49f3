use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const SETTINGS_FILE: &str = "settings.json";

/// The two supervised applications, in declared order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TargetId {
    Focus,
    FocusMe,
}

impl TargetId {
    /// Evaluation order for every monitor tick. The first entry wins ties.
    pub const ALL: [TargetId; 2] = [TargetId::Focus, TargetId::FocusMe];
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum LaunchMethod {
    /// Bring the application to the foreground through simulated input.
    Activate { application: String },
    /// Run a shell command in a new interactive terminal session.
    Terminal { command: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetSettings {
    pub display_name: String,
    pub process_name: String,
    pub launch: LaunchMethod,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub focus: TargetSettings,
    pub focusme: TargetSettings,
    pub tick_secs: u64,
    pub failure_threshold: u32,
    pub cycle_limit: u32,
    pub cycle_pause_secs: u64,
}

impl MonitorSettings {
    pub fn target(&self, id: TargetId) -> &TargetSettings {
        match id {
            TargetId::Focus => &self.focus,
            TargetId::FocusMe => &self.focusme,
        }
    }

    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }

    pub fn cycle_pause(&self) -> Duration {
        Duration::from_secs(self.cycle_pause_secs)
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            focus: TargetSettings {
                display_name: "Focus".into(),
                process_name: "Focus".into(),
                launch: LaunchMethod::Activate {
                    application: "Focus".into(),
                },
            },
            focusme: TargetSettings {
                display_name: "FocusMe".into(),
                process_name: "FocusMe".into(),
                launch: LaunchMethod::Terminal {
                    command: "open -a FocusMe".into(),
                },
            },
            tick_secs: 1,
            failure_threshold: 30,
            cycle_limit: 1200,
            cycle_pause_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogSettings {
    pub period_secs: u64,
}

impl WatchdogSettings {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }
}

impl Default for WatchdogSettings {
    fn default() -> Self {
        Self { period_secs: 10 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationSettings {
    pub monitor_label: String,
    pub watchdog_label: String,
}

impl Default for RegistrationSettings {
    fn default() -> Self {
        Self {
            monitor_label: "com.focusguard.monitor".into(),
            watchdog_label: "com.focusguard.watchdog".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub monitor: MonitorSettings,
    pub watchdog: WatchdogSettings,
    pub registration: RegistrationSettings,
}

pub fn load_settings(home: &Path) -> anyhow::Result<Settings> {
    let path = home.join(SETTINGS_FILE);
    if path.exists() {
        let data = std::fs::read(&path)?;
        Ok(serde_json::from_slice(&data)?)
    } else {
        Ok(Settings::default())
    }
}

pub fn save_settings(home: &Path, settings: &Settings) -> anyhow::Result<()> {
    let data = serde_json::to_vec_pretty(settings)?;
    std::fs::create_dir_all(home)?;
    std::fs::write(home.join(SETTINGS_FILE), data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let settings = load_settings(dir.path()).unwrap();
        assert_eq!(settings.monitor.failure_threshold, 30);
        assert_eq!(settings.monitor.cycle_limit, 1200);
        assert_eq!(settings.monitor.cycle_pause(), Duration::from_secs(60));
        assert_eq!(settings.watchdog.period(), Duration::from_secs(10));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(SETTINGS_FILE),
            br#"{"watchdog": {"period_secs": 3}}"#,
        )
        .unwrap();
        let settings = load_settings(dir.path()).unwrap();
        assert_eq!(settings.watchdog.period_secs, 3);
        assert_eq!(settings.monitor.tick_secs, 1);
        assert_eq!(settings.registration.monitor_label, "com.focusguard.monitor");
    }

    #[test]
    fn saved_settings_load_back() {
        let dir = tempdir().unwrap();
        let mut settings = Settings::default();
        settings.monitor.focusme.launch = LaunchMethod::Terminal {
            command: "open -a Other".into(),
        };
        save_settings(dir.path(), &settings).unwrap();
        let loaded = load_settings(dir.path()).unwrap();
        assert_eq!(loaded.monitor.target(TargetId::FocusMe), &settings.monitor.focusme);
    }
}
