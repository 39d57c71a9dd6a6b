use crate::sequence::{ParadigmParams, generate};
use cogex_core::{EngineError, ExperimentPhase, Result, TrialSpec};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Upper bound on a response window when no timeout is configured.
pub const IMPLICIT_RESPONSE_CAP_MS: u64 = 30_000;

/// Stage durations in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimingConfig {
    /// 0 disables the configured timeout; the window is then bounded by
    /// [`IMPLICIT_RESPONSE_CAP_MS`].
    pub response_timeout_ms: u64,
    pub inter_trial_delay_ms: u64,
    pub fixation_delay_ms: u64,
    pub feedback_duration_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: 2000,
            inter_trial_delay_ms: 1000,
            fixation_delay_ms: 500,
            feedback_duration_ms: 500,
        }
    }
}

impl TimingConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| EngineError::invalid_config("timing", e.to_string()))
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::invalid_config(path.display().to_string(), e.to_string()))?;
        Self::from_json_str(&text)
    }

    pub fn response_window(&self) -> Duration {
        match self.response_timeout_ms {
            0 => Duration::from_millis(IMPLICIT_RESPONSE_CAP_MS),
            ms => Duration::from_millis(ms),
        }
    }
}

/// Everything the engine needs, supplied once at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentConfig {
    pub practice_trials: Vec<TrialSpec>,
    pub main_trials: Vec<TrialSpec>,
    pub timing: TimingConfig,
}

impl ExperimentConfig {
    pub fn new(practice_trials: Vec<TrialSpec>, main_trials: Vec<TrialSpec>) -> Self {
        Self {
            practice_trials,
            main_trials,
            timing: TimingConfig::default(),
        }
    }

    pub fn with_timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    pub fn trials(&self, phase: ExperimentPhase) -> &[TrialSpec] {
        match phase {
            ExperimentPhase::Practice => &self.practice_trials,
            ExperimentPhase::Main => &self.main_trials,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.practice_trials.is_empty() && self.main_trials.is_empty() {
            return Err(EngineError::invalid_config(
                "trials",
                "practice and main trial lists are both empty",
            ));
        }
        for phase in [ExperimentPhase::Practice, ExperimentPhase::Main] {
            for (position, trial) in self.trials(phase).iter().enumerate() {
                if trial.index != position {
                    return Err(EngineError::invalid_config(
                        format!("{phase}_trials[{position}].index"),
                        format!("expected {position}, found {}", trial.index),
                    ));
                }
                if trial.correct_response.is_empty() {
                    return Err(EngineError::invalid_config(
                        format!("{phase}_trials[{position}].correct_response"),
                        "must not be empty",
                    ));
                }
            }
        }
        Ok(())
    }
}

fn default_practice_count() -> usize {
    20
}

fn default_main_count() -> usize {
    100
}

/// Declarative description of a session, loadable from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExperimentPlan {
    pub params: ParadigmParams,
    #[serde(default = "default_practice_count")]
    pub practice_count: usize,
    #[serde(default = "default_main_count")]
    pub main_count: usize,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub timing: TimingConfig,
}

impl ExperimentPlan {
    pub fn new(params: ParadigmParams) -> Self {
        Self {
            params,
            practice_count: default_practice_count(),
            main_count: default_main_count(),
            seed: None,
            timing: TimingConfig::default(),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| EngineError::invalid_config("plan", e.to_string()))
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::invalid_config(path.display().to_string(), e.to_string()))?;
        Self::from_json_str(&text)
    }

    /// Generates both trial lists. The main list uses `seed + 1` so the two
    /// phases differ while staying reproducible.
    pub fn build(&self) -> Result<ExperimentConfig> {
        let practice = match self.practice_count {
            0 => Vec::new(),
            n => generate(&self.params, n, self.seed)?,
        };
        let main = match self.main_count {
            0 => Vec::new(),
            n => generate(&self.params, n, self.seed.map(|s| s.wrapping_add(1)))?,
        };
        let config = ExperimentConfig::new(practice, main).with_timing(self.timing.clone());
        config.validate()?;
        Ok(config)
    }
}
