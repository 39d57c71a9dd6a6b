use std::collections::VecDeque;
use std::time::Duration;

/// Summary of how late scheduled transitions actually fired.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TimingStats {
    pub samples: usize,
    pub average_lateness_ns: f64,
    pub jitter_ns: f64,
    pub min_lateness_ns: f64,
    pub max_lateness_ns: f64,
}

/// Rolling window of lateness samples, oldest dropped first.
#[derive(Debug, Clone)]
pub struct LatenessWindow {
    samples: VecDeque<Duration>,
    max_samples: usize,
}

impl LatenessWindow {
    pub const DEFAULT_MAX_SAMPLES: usize = 1000;

    pub fn new(max_samples: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_samples.min(Self::DEFAULT_MAX_SAMPLES)),
            max_samples: max_samples.max(1),
        }
    }

    pub fn record(&mut self, d: Duration) {
        if self.samples.len() >= self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(d);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn stats(&self) -> TimingStats {
        if self.samples.is_empty() {
            return TimingStats::default();
        }
        let times: Vec<f64> = self.samples.iter().map(|d| d.as_nanos() as f64).collect();
        let n = times.len() as f64;
        let avg = times.iter().sum::<f64>() / n;
        let var = times.iter().map(|x| (x - avg).powi(2)).sum::<f64>() / n;
        let min = times.iter().copied().fold(f64::INFINITY, f64::min);
        let max = times.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        TimingStats {
            samples: times.len(),
            average_lateness_ns: avg,
            jitter_ns: var.sqrt(),
            min_lateness_ns: min,
            max_lateness_ns: max,
        }
    }
}

impl Default for LatenessWindow {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_SAMPLES)
    }
}
