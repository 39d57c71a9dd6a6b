use crate::config::TimingConfig;
use std::time::Duration;

/// Stage durations of every trial, resolved once from the timing config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialDurations {
    pub fixation: Duration,
    pub response_window: Duration,
    pub feedback: Duration,
    pub inter_trial: Duration,
}

impl From<&TimingConfig> for TrialDurations {
    fn from(timing: &TimingConfig) -> Self {
        Self {
            fixation: Duration::from_millis(timing.fixation_delay_ms),
            response_window: timing.response_window(),
            feedback: Duration::from_millis(timing.feedback_duration_ms),
            inter_trial: Duration::from_millis(timing.inter_trial_delay_ms),
        }
    }
}

/// Clock readings for the trial in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrialTimestamps {
    pub fixation_start_ns: Option<u64>,
    pub stimulus_onset_ns: Option<u64>,
    pub response_ns: Option<u64>,
}

impl TrialTimestamps {
    pub fn fixation_started(at_ns: u64) -> Self {
        Self {
            fixation_start_ns: Some(at_ns),
            ..Self::default()
        }
    }
}
