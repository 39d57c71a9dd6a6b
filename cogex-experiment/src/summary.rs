use cogex_core::TrialResult;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionSummary {
    pub trials: usize,
    pub correct: usize,
    pub accuracy: f64,
    pub mean_rt_ms: Option<f64>,
}

/// Descriptive statistics over one result log.
///
/// Reaction-time figures only use correct, non-timed-out trials.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub trials: usize,
    pub responses: usize,
    pub timeouts: usize,
    pub correct: usize,
    pub response_rate: f64,
    pub accuracy: f64,
    pub mean_rt_ms: Option<f64>,
    pub min_rt_ms: Option<f64>,
    pub max_rt_ms: Option<f64>,
    pub by_condition: BTreeMap<String, ConditionSummary>,
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 { 0.0 } else { part as f64 / whole as f64 }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn correct_rts<'a>(results: impl Iterator<Item = &'a TrialResult>) -> Vec<f64> {
    results
        .filter(|r| r.is_correct && !r.timed_out)
        .filter_map(|r| r.reaction_time_ms)
        .collect()
}

impl SessionSummary {
    pub fn from_results(results: &[TrialResult]) -> Self {
        let trials = results.len();
        let timeouts = results.iter().filter(|r| r.timed_out).count();
        let correct = results.iter().filter(|r| r.is_correct).count();
        let rts = correct_rts(results.iter());

        let mut grouped: BTreeMap<String, Vec<&TrialResult>> = BTreeMap::new();
        for result in results {
            if let Some(condition) = &result.condition {
                grouped.entry(condition.clone()).or_default().push(result);
            }
        }
        let by_condition = grouped
            .into_iter()
            .map(|(condition, group)| {
                let correct = group.iter().filter(|r| r.is_correct).count();
                let summary = ConditionSummary {
                    trials: group.len(),
                    correct,
                    accuracy: ratio(correct, group.len()),
                    mean_rt_ms: mean(&correct_rts(group.iter().copied())),
                };
                (condition, summary)
            })
            .collect();

        Self {
            trials,
            responses: trials - timeouts,
            timeouts,
            correct,
            response_rate: ratio(trials - timeouts, trials),
            accuracy: ratio(correct, trials),
            mean_rt_ms: mean(&rts),
            min_rt_ms: rts.iter().copied().reduce(f64::min),
            max_rt_ms: rts.iter().copied().reduce(f64::max),
            by_condition,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cogex_core::{Direction, ExperimentPhase, StimulusPayload, TrialSpec, keys};

    fn trial(index: usize, congruent: bool) -> TrialSpec {
        TrialSpec {
            index,
            stimulus: StimulusPayload::Flanker {
                target: Direction::Left,
                flanker: if congruent { Direction::Left } else { Direction::Right },
            },
            correct_response: keys::LEFT.to_string(),
            condition: Some(if congruent { "congruent" } else { "incongruent" }.to_string()),
            set_size: None,
        }
    }

    #[test]
    fn empty_log_summarises_to_zero() {
        let summary = SessionSummary::from_results(&[]);
        assert_eq!(summary.trials, 0);
        assert_eq!(summary.accuracy, 0.0);
        assert_eq!(summary.mean_rt_ms, None);
        assert!(summary.by_condition.is_empty());
    }

    #[test]
    fn rt_only_counts_correct_responses() {
        let phase = ExperimentPhase::Main;
        let results = vec![
            TrialResult::captured(&trial(0, true), phase, keys::LEFT, 0, 300_000_000),
            TrialResult::captured(&trial(1, false), phase, keys::LEFT, 0, 500_000_000),
            TrialResult::captured(&trial(2, false), phase, keys::RIGHT, 0, 100_000_000),
            TrialResult::timed_out(&trial(3, true), phase, 0),
        ];
        let summary = SessionSummary::from_results(&results);

        assert_eq!(summary.trials, 4);
        assert_eq!(summary.responses, 3);
        assert_eq!(summary.timeouts, 1);
        assert_eq!(summary.correct, 2);
        assert_eq!(summary.response_rate, 0.75);
        assert_eq!(summary.accuracy, 0.5);
        assert_eq!(summary.mean_rt_ms, Some(400.0));
        assert_eq!(summary.min_rt_ms, Some(300.0));
        assert_eq!(summary.max_rt_ms, Some(500.0));

        let incongruent = &summary.by_condition["incongruent"];
        assert_eq!(incongruent.trials, 2);
        assert_eq!(incongruent.correct, 1);
        assert_eq!(incongruent.mean_rt_ms, Some(500.0));
        assert_eq!(summary.by_condition["congruent"].accuracy, 0.5);
    }
}
