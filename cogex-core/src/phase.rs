use serde::{Deserialize, Serialize};
use std::fmt;

/// Named block of trials the participant runs through.
#[derive(Copy, Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentPhase {
    Practice,
    Main,
}

impl ExperimentPhase {
    pub fn next(&self) -> Option<Self> {
        match self {
            ExperimentPhase::Practice => Some(ExperimentPhase::Main),
            ExperimentPhase::Main => None,
        }
    }

    pub fn is_practice(&self) -> bool {
        matches!(self, ExperimentPhase::Practice)
    }

    pub fn is_main(&self) -> bool {
        matches!(self, ExperimentPhase::Main)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExperimentPhase::Practice => "practice",
            ExperimentPhase::Main => "main",
        }
    }
}

impl fmt::Display for ExperimentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Node of the trial engine state machine.
///
/// `Fixation` through `InterTrial` are the per-trial stages and always run
/// inside an active [`ExperimentPhase`]. `Setup`, `PracticeComplete` and
/// `Complete` sit between phases and wait on the host.
#[derive(Copy, Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineStage {
    #[default]
    Setup,
    Fixation,
    Stimulus,
    AwaitingResponse,
    Feedback,
    InterTrial,
    PracticeComplete,
    Complete,
}

impl EngineStage {
    /// Participant input is only considered while a response window is open.
    pub fn allows_input(&self) -> bool {
        matches!(self, EngineStage::AwaitingResponse)
    }

    pub fn is_trial_stage(&self) -> bool {
        matches!(
            self,
            EngineStage::Fixation
                | EngineStage::Stimulus
                | EngineStage::AwaitingResponse
                | EngineStage::Feedback
                | EngineStage::InterTrial
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EngineStage::Complete)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineStage::Setup => "setup",
            EngineStage::Fixation => "fixation",
            EngineStage::Stimulus => "stimulus",
            EngineStage::AwaitingResponse => "awaiting_response",
            EngineStage::Feedback => "feedback",
            EngineStage::InterTrial => "inter_trial",
            EngineStage::PracticeComplete => "practice_complete",
            EngineStage::Complete => "complete",
        }
    }
}

impl fmt::Display for EngineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
