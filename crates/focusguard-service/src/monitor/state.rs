use focusguard_core::settings::{MonitorSettings, TargetId};

/// Counters owned by one monitor process. Never persisted: a restarted
/// monitor starts from zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorState {
    pub iteration_counter: u32,
    pub focus_fail_count: u32,
    pub focusme_fail_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    /// The iteration budget is spent; pause, then resume from zero.
    PauseCycle,
    /// A target failed too often; stop checking for good.
    PauseIndefinitely(TargetId),
}

#[derive(Debug, Clone, Copy)]
pub struct PausePolicy {
    pub failure_threshold: u32,
    pub cycle_limit: u32,
}

impl From<&MonitorSettings> for PausePolicy {
    fn from(settings: &MonitorSettings) -> Self {
        Self {
            failure_threshold: settings.failure_threshold,
            cycle_limit: settings.cycle_limit,
        }
    }
}

impl MonitorState {
    pub fn fail_count(&self, id: TargetId) -> u32 {
        match id {
            TargetId::Focus => self.focus_fail_count,
            TargetId::FocusMe => self.focusme_fail_count,
        }
    }

    fn fail_count_mut(&mut self, id: TargetId) -> &mut u32 {
        match id {
            TargetId::Focus => &mut self.focus_fail_count,
            TargetId::FocusMe => &mut self.focusme_fail_count,
        }
    }

    /// Record one presence check and return the target's new fail count.
    pub fn record_check(&mut self, id: TargetId, running: bool) -> u32 {
        let count = self.fail_count_mut(id);
        if running {
            *count = 0;
        } else {
            *count = count.saturating_add(1);
        }
        *count
    }

    /// Apply the pause rules after both targets were checked this tick.
    pub fn evaluate(&mut self, policy: &PausePolicy) -> TickOutcome {
        for id in TargetId::ALL {
            if self.fail_count(id) >= policy.failure_threshold {
                return TickOutcome::PauseIndefinitely(id);
            }
        }
        self.iteration_counter += 1;
        if self.iteration_counter >= policy.cycle_limit {
            self.iteration_counter = 0;
            return TickOutcome::PauseCycle;
        }
        TickOutcome::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY: PausePolicy = PausePolicy {
        failure_threshold: 30,
        cycle_limit: 1200,
    };

    #[test]
    fn running_check_resets_any_count_below_threshold() {
        for prior in [1, 7, 29] {
            let mut state = MonitorState {
                focusme_fail_count: prior,
                ..Default::default()
            };
            assert_eq!(state.record_check(TargetId::FocusMe, true), 0);
        }
    }

    #[test]
    fn counters_are_independent() {
        let mut state = MonitorState::default();
        state.record_check(TargetId::Focus, false);
        state.record_check(TargetId::Focus, false);
        state.record_check(TargetId::FocusMe, true);
        assert_eq!(state.fail_count(TargetId::Focus), 2);
        assert_eq!(state.fail_count(TargetId::FocusMe), 0);
    }

    #[test]
    fn threshold_reached_pauses_indefinitely() {
        let mut state = MonitorState {
            focusme_fail_count: 29,
            ..Default::default()
        };
        assert_eq!(state.evaluate(&POLICY), TickOutcome::Continue);
        state.record_check(TargetId::FocusMe, false);
        assert_eq!(
            state.evaluate(&POLICY),
            TickOutcome::PauseIndefinitely(TargetId::FocusMe)
        );
    }

    #[test]
    fn first_declared_target_wins_a_tie() {
        let mut state = MonitorState {
            focus_fail_count: 30,
            focusme_fail_count: 30,
            ..Default::default()
        };
        assert_eq!(
            state.evaluate(&POLICY),
            TickOutcome::PauseIndefinitely(TargetId::Focus)
        );
    }

    #[test]
    fn cycle_limit_pauses_once_and_keeps_fail_counts() {
        let mut state = MonitorState {
            iteration_counter: 1198,
            focus_fail_count: 4,
            focusme_fail_count: 9,
        };
        assert_eq!(state.evaluate(&POLICY), TickOutcome::Continue);
        assert_eq!(state.evaluate(&POLICY), TickOutcome::PauseCycle);
        assert_eq!(state.iteration_counter, 0);
        assert_eq!(state.focus_fail_count, 4);
        assert_eq!(state.focusme_fail_count, 9);
        assert_eq!(state.evaluate(&POLICY), TickOutcome::Continue);
        assert_eq!(state.iteration_counter, 1);
    }

    #[test]
    fn indefinite_pause_does_not_advance_the_cycle() {
        let mut state = MonitorState {
            iteration_counter: 1199,
            focus_fail_count: 30,
            ..Default::default()
        };
        assert_eq!(
            state.evaluate(&POLICY),
            TickOutcome::PauseIndefinitely(TargetId::Focus)
        );
        assert_eq!(state.iteration_counter, 1199);
    }
}
