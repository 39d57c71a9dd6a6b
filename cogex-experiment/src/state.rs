use crate::capture::CaptureHandle;
use crate::recorder::ResultRecorder;
use crate::trial::TrialTimestamps;
use cogex_core::{EngineStage, ExperimentPhase};
use cogex_timing::CancelToken;

/// The engine's single mutable state object.
#[derive(Debug, Clone)]
pub struct EngineState {
    pub stage: EngineStage,
    pub phase: Option<ExperimentPhase>,
    pub current_trial_index: usize,
    pub recorder: ResultRecorder,
    pub pending_timer: Option<CancelToken>,
    pub open_capture: Option<CaptureHandle>,
    pub timestamps: TrialTimestamps,
    pub experiment_completed: bool,
}

impl EngineState {
    pub fn new(practice_trials: usize, main_trials: usize) -> Self {
        Self {
            stage: EngineStage::Setup,
            phase: None,
            current_trial_index: 0,
            recorder: ResultRecorder::new(practice_trials, main_trials),
            pending_timer: None,
            open_capture: None,
            timestamps: TrialTimestamps::default(),
            experiment_completed: false,
        }
    }

    /// Number of pending timers plus open capture windows.
    pub fn outstanding(&self) -> usize {
        usize::from(self.pending_timer.is_some()) + usize::from(self.open_capture.is_some())
    }
}
