use cogex_core::{EngineError, ExperimentPhase, Result, TrialResult};
use std::sync::Arc;

/// Ordered, append-only practice and main logs.
#[derive(Debug, Clone, Default)]
pub struct ResultRecorder {
    practice: Vec<TrialResult>,
    main: Vec<TrialResult>,
    practice_capacity: usize,
    main_capacity: usize,
}

impl ResultRecorder {
    pub fn new(practice_capacity: usize, main_capacity: usize) -> Self {
        Self {
            practice: Vec::with_capacity(practice_capacity),
            main: Vec::with_capacity(main_capacity),
            practice_capacity,
            main_capacity,
        }
    }

    /// Appends `result` to the log of `phase`.
    ///
    /// Results must arrive in trial order, one per trial, and belong to the
    /// phase they are filed under.
    pub fn record(&mut self, phase: ExperimentPhase, result: TrialResult) -> Result<()> {
        if result.phase != phase {
            return Err(EngineError::invariant(format!(
                "{} result for trial {} filed under {phase}",
                result.phase, result.trial_index
            )));
        }
        let capacity = self.capacity(phase);
        let log = self.log_mut(phase);
        if log.len() >= capacity {
            return Err(EngineError::invariant(format!(
                "{phase} log already holds all {capacity} results"
            )));
        }
        if result.trial_index != log.len() {
            return Err(EngineError::invariant(format!(
                "{phase} result for trial {} arrived when trial {} was expected",
                result.trial_index,
                log.len()
            )));
        }
        log.push(result);
        Ok(())
    }

    /// Read-only snapshot of the log for `phase`.
    pub fn flush(&self, phase: ExperimentPhase) -> Arc<[TrialResult]> {
        Arc::from(self.results(phase))
    }

    pub fn results(&self, phase: ExperimentPhase) -> &[TrialResult] {
        match phase {
            ExperimentPhase::Practice => &self.practice,
            ExperimentPhase::Main => &self.main,
        }
    }

    pub fn len(&self, phase: ExperimentPhase) -> usize {
        self.results(phase).len()
    }

    pub fn is_full(&self, phase: ExperimentPhase) -> bool {
        self.len(phase) >= self.capacity(phase)
    }

    pub fn capacity(&self, phase: ExperimentPhase) -> usize {
        match phase {
            ExperimentPhase::Practice => self.practice_capacity,
            ExperimentPhase::Main => self.main_capacity,
        }
    }

    fn log_mut(&mut self, phase: ExperimentPhase) -> &mut Vec<TrialResult> {
        match phase {
            ExperimentPhase::Practice => &mut self.practice,
            ExperimentPhase::Main => &mut self.main,
        }
    }
}
