//! Keeps Focus and FocusMe running.
//!
//! Every tick checks both targets in declared order, launches whichever is
//! missing, then applies the pause rules from [`MonitorState::evaluate`].
//! The tick sleep starts after the tick's work, so slow launches stretch the
//! cadence instead of piling up.

mod state;

pub use state::{MonitorState, PausePolicy, TickOutcome};

use focusguard_core::automation::{AutomationBridge, AutomationError, Notifier};
use focusguard_core::settings::{LaunchMethod, MonitorSettings, TargetId, TargetSettings};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::probe::ProcessProbe;

const NOTIFICATION_TITLE: &str = "FocusGuard";

pub struct ProcessMonitor<P: ProcessProbe> {
    settings: MonitorSettings,
    policy: PausePolicy,
    probe: P,
    bridge: Arc<dyn AutomationBridge>,
    notifier: Arc<dyn Notifier>,
    state: MonitorState,
}

impl<P: ProcessProbe> ProcessMonitor<P> {
    pub fn new(
        settings: MonitorSettings,
        probe: P,
        bridge: Arc<dyn AutomationBridge>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let policy = PausePolicy::from(&settings);
        Self {
            settings,
            policy,
            probe,
            bridge,
            notifier,
            state: MonitorState::default(),
        }
    }

    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    /// One pass over both targets.
    pub fn tick(&mut self) -> TickOutcome {
        self.probe.refresh();
        for id in TargetId::ALL {
            let target = self.settings.target(id);
            let running = self.probe.is_running(&target.process_name);
            let fails = self.state.record_check(id, running);
            if running {
                continue;
            }
            debug!(app = %target.display_name, fails, "target not running; launching");
            if let Err(e) = launch(self.bridge.as_ref(), target) {
                warn!(app = %target.display_name, error = %e, "launch failed");
            }
        }
        self.state.evaluate(&self.policy)
    }

    /// Run until the process is stopped. An indefinite pause parks the loop
    /// forever.
    pub async fn run(mut self) {
        info!(
            tick_secs = self.settings.tick_secs,
            threshold = self.policy.failure_threshold,
            "process monitor running"
        );
        loop {
            match self.tick() {
                TickOutcome::Continue => tokio::time::sleep(self.settings.tick()).await,
                TickOutcome::PauseCycle => {
                    let pause = self.settings.cycle_pause();
                    info!(pause_secs = pause.as_secs(), "monitoring cycle complete; pausing");
                    self.notify(&format!(
                        "Monitoring paused for {} seconds",
                        pause.as_secs()
                    ));
                    tokio::time::sleep(pause).await;
                }
                TickOutcome::PauseIndefinitely(id) => {
                    let target = self.settings.target(id);
                    error!(
                        app = %target.display_name,
                        fails = self.state.fail_count(id),
                        "target keeps failing; monitoring stopped"
                    );
                    self.notify(&format!(
                        "{} failed to start {} times in a row; monitoring stopped",
                        target.display_name, self.policy.failure_threshold
                    ));
                    std::future::pending::<()>().await;
                }
            }
        }
    }

    fn notify(&self, message: &str) {
        if let Err(e) = self.notifier.notify(NOTIFICATION_TITLE, message) {
            warn!(error = %e, "notification failed");
        }
    }
}

fn launch(bridge: &dyn AutomationBridge, target: &TargetSettings) -> Result<(), AutomationError> {
    match &target.launch {
        LaunchMethod::Activate { application } => bridge.activate_application(application),
        LaunchMethod::Terminal { command } => bridge.run_in_terminal(command),
    }
}
