use crate::phase::ExperimentPhase;
use crate::stimulus::StimulusPayload;
use serde::{Deserialize, Serialize};

/// Response recorded when no qualifying input arrived within the window.
pub const TIMEOUT_RESPONSE: &str = "timeout";

/// Immutable description of one trial within its phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialSpec {
    pub index: usize,
    pub stimulus: StimulusPayload,
    pub correct_response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_size: Option<u32>,
}

/// Recorded result per trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub trial_index: usize,
    pub phase: ExperimentPhase,
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reaction_time_ms: Option<f64>,
    pub is_correct: bool,
    pub timed_out: bool,
    pub started_at_ns: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responded_at_ns: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_size: Option<u32>,
}

impl TrialResult {
    /// Result for a trial whose response window captured `response`.
    pub fn captured(
        trial: &TrialSpec,
        phase: ExperimentPhase,
        response: impl Into<String>,
        started_at_ns: u64,
        responded_at_ns: u64,
    ) -> Self {
        let response = response.into();
        let rt_ns = responded_at_ns.saturating_sub(started_at_ns);
        Self {
            trial_index: trial.index,
            phase,
            is_correct: response == trial.correct_response,
            response,
            reaction_time_ms: Some(rt_ns as f64 / 1_000_000.0),
            timed_out: false,
            started_at_ns,
            responded_at_ns: Some(responded_at_ns),
            condition: trial.condition.clone(),
            set_size: trial.set_size,
        }
    }

    /// Result for a trial whose response window expired.
    pub fn timed_out(trial: &TrialSpec, phase: ExperimentPhase, started_at_ns: u64) -> Self {
        Self {
            trial_index: trial.index,
            phase,
            response: TIMEOUT_RESPONSE.to_string(),
            reaction_time_ms: None,
            is_correct: false,
            timed_out: true,
            started_at_ns,
            responded_at_ns: None,
            condition: trial.condition.clone(),
            set_size: trial.set_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stimulus::{Direction, keys};

    fn flanker_trial() -> TrialSpec {
        TrialSpec {
            index: 3,
            stimulus: StimulusPayload::Flanker {
                target: Direction::Left,
                flanker: Direction::Left,
            },
            correct_response: keys::LEFT.to_string(),
            condition: Some("congruent".to_string()),
            set_size: None,
        }
    }

    #[test]
    fn captured_result_measures_from_stimulus_onset() {
        let trial = flanker_trial();
        let result = TrialResult::captured(
            &trial,
            ExperimentPhase::Main,
            keys::LEFT,
            5_000_000,
            255_000_000,
        );
        assert_eq!(result.trial_index, 3);
        assert_eq!(result.reaction_time_ms, Some(250.0));
        assert!(result.is_correct);
        assert!(!result.timed_out);
        assert_eq!(result.condition.as_deref(), Some("congruent"));
    }

    #[test]
    fn wrong_key_is_incorrect() {
        let trial = flanker_trial();
        let result = TrialResult::captured(&trial, ExperimentPhase::Practice, keys::RIGHT, 0, 1);
        assert!(!result.is_correct);
    }

    #[test]
    fn timeout_has_no_reaction_time() {
        let trial = flanker_trial();
        let result = TrialResult::timed_out(&trial, ExperimentPhase::Practice, 42);
        assert_eq!(result.response, TIMEOUT_RESPONSE);
        assert!(result.timed_out);
        assert!(!result.is_correct);
        assert!(result.reaction_time_ms.is_none());
        assert!(result.responded_at_ns.is_none());

        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("reaction_time_ms").is_none());
        assert_eq!(json["phase"], "practice");
    }
}
