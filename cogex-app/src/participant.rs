use cogex_core::TrialSpec;
use rand::rngs::StdRng;
use rand::seq::IteratorRandom;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;
use std::time::Duration;

/// Fastest reaction the simulated participant produces.
const MIN_RT_MS: f64 = 120.0;

fn probability(p: f64) -> f64 {
    if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedResponse {
    pub key: String,
    pub after: Duration,
}

/// Seeded stand-in for a human at the keyboard.
///
/// Reaction times are ex-Gaussian shaped: a narrow symmetric component
/// carrying 80% of the mean plus an exponential tail carrying the rest.
#[derive(Debug, Clone)]
pub struct SimulatedParticipant {
    rng: StdRng,
    accuracy: f64,
    mean_rt_ms: f64,
    miss_rate: f64,
}

impl SimulatedParticipant {
    /// Out-of-range rates are clamped. NaN rates become 0 and a non-finite
    /// mean reaction time becomes [`MIN_RT_MS`].
    pub fn new(seed: u64, accuracy: f64, mean_rt_ms: f64, miss_rate: f64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            accuracy: probability(accuracy),
            mean_rt_ms: if mean_rt_ms.is_finite() { mean_rt_ms.max(MIN_RT_MS) } else { MIN_RT_MS },
            miss_rate: probability(miss_rate),
        }
    }

    /// Decides how to answer `trial`, or `None` to let it time out.
    pub fn respond(&mut self, trial: &TrialSpec, valid: &BTreeSet<String>) -> Option<PlannedResponse> {
        if self.rng.random_bool(self.miss_rate) {
            return None;
        }
        let key = if self.rng.random_bool(self.accuracy) {
            trial.correct_response.clone()
        } else {
            valid
                .iter()
                .filter(|k| **k != trial.correct_response)
                .choose(&mut self.rng)
                .cloned()
                .unwrap_or_else(|| trial.correct_response.clone())
        };
        Some(PlannedResponse {
            key,
            after: Duration::from_secs_f64(self.reaction_time_ms() / 1000.0),
        })
    }

    fn reaction_time_ms(&mut self) -> f64 {
        let body = 0.8 * self.mean_rt_ms * (0.75 + 0.5 * self.rng.random::<f64>());
        let tail = -0.2 * self.mean_rt_ms * (1.0 - self.rng.random::<f64>()).ln();
        (body + tail).max(MIN_RT_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cogex_core::{Direction, StimulusPayload, keys};

    fn trial() -> (TrialSpec, BTreeSet<String>) {
        let trial = TrialSpec {
            index: 0,
            stimulus: StimulusPayload::Posner {
                cue: Direction::Left,
                target: Direction::Left,
            },
            correct_response: keys::LEFT.to_string(),
            condition: Some("valid".to_string()),
            set_size: None,
        };
        let valid = [keys::LEFT, keys::RIGHT].iter().map(|k| k.to_string()).collect();
        (trial, valid)
    }

    #[test]
    fn same_seed_same_behaviour() {
        let (trial, valid) = trial();
        let mut a = SimulatedParticipant::new(5, 0.8, 400.0, 0.1);
        let mut b = SimulatedParticipant::new(5, 0.8, 400.0, 0.1);
        for _ in 0..50 {
            assert_eq!(a.respond(&trial, &valid), b.respond(&trial, &valid));
        }
    }

    #[test]
    fn perfect_participant_always_answers_correctly() {
        let (trial, valid) = trial();
        let mut p = SimulatedParticipant::new(1, 1.0, 400.0, 0.0);
        for _ in 0..100 {
            let planned = p.respond(&trial, &valid).unwrap();
            assert_eq!(planned.key, keys::LEFT);
            assert!(planned.after >= Duration::from_millis(120));
        }
    }

    #[test]
    fn wrong_answers_use_another_valid_key() {
        let (trial, valid) = trial();
        let mut p = SimulatedParticipant::new(2, 0.0, 400.0, 0.0);
        assert_eq!(p.respond(&trial, &valid).unwrap().key, keys::RIGHT);
    }

    #[test]
    fn absent_participant_never_responds() {
        let (trial, valid) = trial();
        let mut p = SimulatedParticipant::new(3, 1.0, 400.0, 1.0);
        assert!((0..20).all(|_| p.respond(&trial, &valid).is_none()));
    }

    #[test]
    fn non_finite_settings_do_not_panic() {
        let (trial, valid) = trial();
        let mut p = SimulatedParticipant::new(6, f64::NAN, f64::INFINITY, f64::NAN);
        for _ in 0..20 {
            let planned = p.respond(&trial, &valid).unwrap();
            assert_eq!(planned.key, keys::RIGHT);
            assert!(planned.after < Duration::from_secs(60));
        }
    }

    #[test]
    fn mean_reaction_time_is_close_to_target() {
        let (trial, valid) = trial();
        let mut p = SimulatedParticipant::new(4, 1.0, 500.0, 0.0);
        let n = 2000;
        let total: f64 = (0..n)
            .map(|_| p.respond(&trial, &valid).unwrap().after.as_secs_f64() * 1000.0)
            .sum();
        let mean = total / n as f64;
        assert!((450.0..550.0).contains(&mean), "mean {mean}");
    }
}
