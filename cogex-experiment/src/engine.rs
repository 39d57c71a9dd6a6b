//! Trial execution engine.
//!
//! A cooperative, single-threaded automaton. Between calls the engine has
//! exactly one thing it is waiting for: a pending [`PhaseTimer`] deadline,
//! a participant response (with its timeout armed), or a host call at a
//! phase boundary. The host drives it by calling [`TrialEngine::tick`] from
//! its event loop and forwarding input through
//! [`TrialEngine::submit_response`]; each call performs at most one
//! transition and returns.

use crate::capture::{CaptureOutcome, CapturedResponse, ResponseCapture};
use crate::config::ExperimentConfig;
use crate::events::{EngineEvent, EngineObserver};
use crate::paradigm::ParadigmAdapter;
use crate::persistence::{NullPersistence, Persistence, SaveOutcome};
use crate::state::EngineState;
use crate::trial::{TrialDurations, TrialTimestamps};
use cogex_core::{EngineError, EngineStage, ExperimentPhase, Result, TrialResult, TrialSpec};
use cogex_timing::{Clock, HighPrecisionTimer, PhaseTimer, TimingStats};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// What a pending timer does when it fires.
#[derive(Copy, Debug, Clone, PartialEq, Eq)]
enum TimerEvent {
    FixationElapsed,
    ResponseTimeout,
    FeedbackElapsed,
    InterTrialElapsed,
}

pub struct TrialEngine<A: ParadigmAdapter, C: Clock = HighPrecisionTimer> {
    config: ExperimentConfig,
    durations: TrialDurations,
    adapter: A,
    timer: PhaseTimer<C, TimerEvent>,
    capture: ResponseCapture,
    state: EngineState,
    observers: Vec<Box<dyn EngineObserver>>,
    persistence: Box<dyn Persistence>,
    fault: Option<EngineError>,
}

impl<A: ParadigmAdapter, C: Clock> TrialEngine<A, C> {
    /// Validates `config` against `adapter` and builds an engine in the
    /// `setup` stage.
    pub fn new(config: ExperimentConfig, adapter: A, clock: C) -> Result<Self> {
        config.validate()?;
        for phase in [ExperimentPhase::Practice, ExperimentPhase::Main] {
            for trial in config.trials(phase) {
                check_trial(&adapter, phase, trial)?;
            }
        }

        let durations = TrialDurations::from(&config.timing);
        let state = EngineState::new(config.practice_trials.len(), config.main_trials.len());
        debug!(
            paradigm = %adapter.paradigm(),
            practice = config.practice_trials.len(),
            main = config.main_trials.len(),
            ?durations,
            "trial engine created"
        );
        Ok(Self {
            config,
            durations,
            adapter,
            timer: PhaseTimer::new(clock),
            capture: ResponseCapture::new(),
            state,
            observers: Vec::new(),
            persistence: Box::new(NullPersistence),
            fault: None,
        })
    }

    pub fn with_persistence(mut self, persistence: impl Persistence + 'static) -> Self {
        self.persistence = Box::new(persistence);
        self
    }

    pub fn with_observer(mut self, observer: impl EngineObserver + 'static) -> Self {
        self.subscribe(observer);
        self
    }

    pub fn subscribe(&mut self, observer: impl EngineObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn start_practice(&mut self) -> Result<()> {
        self.ensure_healthy()?;
        if self.state.stage != EngineStage::Setup {
            return Err(EngineError::InvalidTransition {
                operation: "start the practice phase",
                stage: self.state.stage,
            });
        }
        let result = self.begin_phase(ExperimentPhase::Practice);
        self.latch(result)
    }

    pub fn start_main_task(&mut self) -> Result<()> {
        self.ensure_healthy()?;
        if self.state.stage != EngineStage::PracticeComplete {
            return Err(EngineError::InvalidTransition {
                operation: "start the main task",
                stage: self.state.stage,
            });
        }
        let result = self.begin_phase(ExperimentPhase::Main);
        self.latch(result)
    }

    /// Fires the pending timer if it is due. Returns whether a transition
    /// happened.
    pub fn tick(&mut self) -> Result<bool> {
        self.ensure_healthy()?;
        let Some(event) = self.timer.poll() else {
            return Ok(false);
        };
        let result = self.dispatch(event);
        self.latch(result)?;
        Ok(true)
    }

    /// Hands one participant input to the engine.
    ///
    /// Input that does not qualify (no open window, irrelevant key, stamped
    /// before stimulus onset, second press) is reported as ignored rather
    /// than rejected. If the input is stamped at or after the response
    /// deadline the timeout is applied first and the input is ignored.
    pub fn submit_response(&mut self, input: &str, timestamp_ns: u64) -> Result<CaptureOutcome> {
        self.ensure_healthy()?;
        if self.state.stage == EngineStage::AwaitingResponse {
            if let Some(event) = self.timer.poll_at(timestamp_ns) {
                let result = self.dispatch(event);
                self.latch(result)?;
            }
        }

        let outcome = self.capture.offer(input, timestamp_ns);
        match &outcome {
            CaptureOutcome::Accepted(captured) => {
                let result = self.accept_response(captured.clone());
                self.latch(result)?;
            }
            CaptureOutcome::Ignored(reason) => {
                trace!(input, ?reason, stage = %self.state.stage, "input ignored");
            }
        }
        Ok(outcome)
    }

    /// Cancels anything outstanding and returns to `setup` with empty logs.
    /// Results buffered by the persistence collaborator are discarded too.
    pub fn reset(&mut self) {
        self.release_outstanding();
        self.persistence.reset();
        let from = self.state.stage;
        self.state = EngineState::new(
            self.config.practice_trials.len(),
            self.config.main_trials.len(),
        );
        info!(from = %from, "engine reset");
        if from != EngineStage::Setup {
            self.emit(EngineEvent::StageChanged {
                from,
                to: EngineStage::Setup,
                phase: None,
            });
        }
    }

    /// The state-machine stage the engine is in.
    pub fn current_phase(&self) -> EngineStage {
        self.state.stage
    }

    /// Practice or main, once a phase has started.
    pub fn active_phase(&self) -> Option<ExperimentPhase> {
        self.state.phase
    }

    pub fn current_trial_index(&self) -> usize {
        self.state.current_trial_index
    }

    pub fn current_trial(&self) -> Option<&TrialSpec> {
        if !self.state.stage.is_trial_stage() {
            return None;
        }
        let phase = self.state.phase?;
        self.config.trials(phase).get(self.state.current_trial_index)
    }

    pub fn total_trials(&self, phase: ExperimentPhase) -> usize {
        self.config.trials(phase).len()
    }

    pub fn results(&self, phase: ExperimentPhase) -> &[TrialResult] {
        self.state.recorder.results(phase)
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn clock(&self) -> &C {
        self.timer.clock()
    }

    /// How long the host may wait before the next `tick` has work to do.
    pub fn time_until_next_deadline(&self) -> Option<Duration> {
        self.timer.time_until_due()
    }

    /// Lateness of fired transitions relative to their deadlines.
    pub fn timing_stats(&self) -> TimingStats {
        self.timer.timing_stats()
    }

    pub fn is_complete(&self) -> bool {
        self.state.stage.is_terminal()
    }

    pub fn fault(&self) -> Option<&EngineError> {
        self.fault.as_ref()
    }

    fn ensure_healthy(&self) -> Result<()> {
        match &self.fault {
            Some(fault) => Err(fault.clone()),
            None => Ok(()),
        }
    }

    /// Invariant violations halt the engine for good.
    fn latch<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(EngineError::InvariantViolation(message)) = &result {
            error!(%message, stage = %self.state.stage, "engine invariant violated, halting");
            self.fault = Some(EngineError::InvariantViolation(message.clone()));
            self.release_outstanding();
        }
        result
    }

    fn release_outstanding(&mut self) {
        if let Some(token) = self.state.pending_timer.take() {
            self.timer.cancel(token);
        }
        if let Some(stray) = self.timer.cancel_all() {
            warn!(token = %stray, "untracked timer was pending");
        }
        if let Some(handle) = self.state.open_capture.take() {
            self.capture.close_window(handle);
        }
        if let Some(stray) = self.capture.open_handle() {
            warn!(handle = %stray, "untracked response window was open");
            self.capture.close_window(stray);
        }
    }

    fn emit(&mut self, event: EngineEvent) {
        trace!(kind = event.kind(), "engine event");
        for observer in &mut self.observers {
            observer.on_event(&event);
        }
    }

    fn set_stage(&mut self, to: EngineStage) {
        let from = self.state.stage;
        self.state.stage = to;
        debug!(
            %from,
            %to,
            phase = ?self.state.phase,
            trial = self.state.current_trial_index,
            "stage transition"
        );
        self.emit(EngineEvent::StageChanged {
            from,
            to,
            phase: self.state.phase,
        });
    }

    fn arm(&mut self, delay: Duration, event: TimerEvent) -> Result<()> {
        let token = self
            .timer
            .schedule(delay, event)
            .map_err(|e| EngineError::invariant(e.to_string()))?;
        self.state.pending_timer = Some(token);
        Ok(())
    }

    fn active(&self) -> Result<(ExperimentPhase, usize, TrialSpec)> {
        let phase = self
            .state
            .phase
            .ok_or_else(|| EngineError::invariant(format!("no active phase in {}", self.state.stage)))?;
        let index = self.state.current_trial_index;
        let trial = self
            .config
            .trials(phase)
            .get(index)
            .cloned()
            .ok_or_else(|| EngineError::invariant(format!("{phase} has no trial {index}")))?;
        Ok((phase, index, trial))
    }

    fn begin_phase(&mut self, phase: ExperimentPhase) -> Result<()> {
        let trials = self.config.trials(phase).len();
        info!(%phase, trials, "starting phase");
        self.state.phase = Some(phase);
        self.state.current_trial_index = 0;
        if trials == 0 {
            return self.complete_phase(phase);
        }
        self.enter_fixation()
    }

    fn dispatch(&mut self, event: TimerEvent) -> Result<()> {
        // the timer that delivered `event` is spent
        self.state.pending_timer = None;
        match (event, self.state.stage) {
            (TimerEvent::FixationElapsed, EngineStage::Fixation) => self.present_stimulus(),
            (TimerEvent::ResponseTimeout, EngineStage::AwaitingResponse) => self.expire_response_window(),
            (TimerEvent::FeedbackElapsed, EngineStage::Feedback) => self.enter_inter_trial(),
            (TimerEvent::InterTrialElapsed, EngineStage::InterTrial) => self.advance_trial(),
            (event, stage) => Err(EngineError::invariant(format!(
                "{event:?} fired during the {stage} stage"
            ))),
        }
    }

    fn enter_fixation(&mut self) -> Result<()> {
        self.state.timestamps = TrialTimestamps::fixation_started(self.timer.now());
        self.set_stage(EngineStage::Fixation);
        self.arm(self.durations.fixation, TimerEvent::FixationElapsed)
    }

    fn present_stimulus(&mut self) -> Result<()> {
        let (phase, index, trial) = self.active()?;
        self.set_stage(EngineStage::Stimulus);

        let started_at_ns = self.timer.now();
        self.state.timestamps.stimulus_onset_ns = Some(started_at_ns);
        let frame = self.adapter.render_stimulus(&trial, phase);
        let valid = self.adapter.valid_responses(&trial);
        self.emit(EngineEvent::TrialStarted {
            trial,
            index,
            phase,
            frame,
            started_at_ns,
        });

        let handle = self
            .capture
            .open_window(valid, started_at_ns)
            .map_err(|e| EngineError::invariant(e.to_string()))?;
        self.state.open_capture = Some(handle);
        self.set_stage(EngineStage::AwaitingResponse);
        self.arm(self.durations.response_window, TimerEvent::ResponseTimeout)
    }

    fn expire_response_window(&mut self) -> Result<()> {
        if let Some(handle) = self.state.open_capture.take() {
            self.capture.close_window(handle);
        }
        let (phase, index, _) = self.active()?;
        debug!(%phase, trial = index, "response window timed out");
        self.emit(EngineEvent::ResponseTimedOut { index, phase });
        self.finish_trial(None)
    }

    fn accept_response(&mut self, captured: CapturedResponse) -> Result<()> {
        if let Some(token) = self.state.pending_timer.take() {
            self.timer.cancel(token);
        }
        // accepting a response closes the window inside the capture
        self.state.open_capture = None;
        self.state.timestamps.response_ns = Some(captured.timestamp_ns);

        let (phase, index, _) = self.active()?;
        self.emit(EngineEvent::ResponseCaptured {
            index,
            phase,
            response: captured.input.clone(),
            timestamp_ns: captured.timestamp_ns,
        });
        self.finish_trial(Some(captured))
    }

    fn finish_trial(&mut self, captured: Option<CapturedResponse>) -> Result<()> {
        let (phase, index, trial) = self.active()?;
        let started_at_ns = self
            .state
            .timestamps
            .stimulus_onset_ns
            .ok_or_else(|| EngineError::invariant(format!("trial {index} ended before its stimulus")))?;

        let result = match captured {
            Some(c) => TrialResult::captured(&trial, phase, c.input, started_at_ns, c.timestamp_ns),
            None => TrialResult::timed_out(&trial, phase, started_at_ns),
        };
        self.state.recorder.record(phase, result.clone())?;
        debug!(
            %phase,
            trial = index,
            response = %result.response,
            rt_ms = ?result.reaction_time_ms,
            correct = result.is_correct,
            "trial recorded"
        );

        self.emit(EngineEvent::TrialEnded {
            result: result.clone(),
            trial,
            index,
            phase,
        });
        self.persist(phase, index, &result);

        self.set_stage(EngineStage::Feedback);
        self.arm(self.durations.feedback, TimerEvent::FeedbackElapsed)
    }

    fn persist(&mut self, phase: ExperimentPhase, index: usize, result: &TrialResult) {
        let outcome = match self.persistence.save(result) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(%phase, trial = index, error = %e, "result not saved, kept locally");
                SaveOutcome::local_only()
            }
        };
        self.emit(EngineEvent::ResultSaved {
            index,
            phase,
            outcome,
        });
    }

    fn enter_inter_trial(&mut self) -> Result<()> {
        self.set_stage(EngineStage::InterTrial);
        self.arm(self.durations.inter_trial, TimerEvent::InterTrialElapsed)
    }

    fn advance_trial(&mut self) -> Result<()> {
        let (phase, index, _) = self.active()?;
        let next = index + 1;
        if next < self.config.trials(phase).len() {
            self.state.current_trial_index = next;
            self.enter_fixation()
        } else {
            self.complete_phase(phase)
        }
    }

    fn complete_phase(&mut self, phase: ExperimentPhase) -> Result<()> {
        let results = self.state.recorder.flush(phase);
        let expected = self.config.trials(phase).len();
        if results.len() != expected {
            return Err(EngineError::invariant(format!(
                "{phase} completed with {} of {expected} results",
                results.len()
            )));
        }
        let correct = results.iter().filter(|r| r.is_correct).count();
        info!(%phase, trials = results.len(), correct, "phase complete");
        self.emit(EngineEvent::PhaseCompleted { phase, results });

        match phase {
            ExperimentPhase::Practice => {
                self.set_stage(EngineStage::PracticeComplete);
                Ok(())
            }
            ExperimentPhase::Main => {
                self.set_stage(EngineStage::Complete);
                self.complete_experiment();
                Ok(())
            }
        }
    }

    fn complete_experiment(&mut self) {
        if self.state.experiment_completed {
            return;
        }
        self.state.experiment_completed = true;
        let main_results = self.state.recorder.flush(ExperimentPhase::Main);
        let practice_results = self.state.recorder.flush(ExperimentPhase::Practice);
        info!(
            main = main_results.len(),
            practice = practice_results.len(),
            "experiment complete"
        );
        self.emit(EngineEvent::ExperimentCompleted {
            main_results,
            practice_results,
        });

        let outcome = match self.persistence.finish() {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "session flush failed, results kept locally");
                SaveOutcome::local_only()
            }
        };
        self.emit(EngineEvent::SessionFlushed { outcome });
    }
}

impl<A: ParadigmAdapter, C: Clock> Drop for TrialEngine<A, C> {
    fn drop(&mut self) {
        if self.state.outstanding() > 0 {
            debug!(stage = %self.state.stage, "engine dropped mid-trial, releasing timer and window");
        }
        self.release_outstanding();
    }
}

fn check_trial<A: ParadigmAdapter>(adapter: &A, phase: ExperimentPhase, trial: &TrialSpec) -> Result<()> {
    let field = || format!("{phase}_trials[{}]", trial.index);
    if trial.stimulus.paradigm() != adapter.paradigm() {
        return Err(EngineError::invalid_config(
            field(),
            format!(
                "{} stimulus given to the {} adapter",
                trial.stimulus.paradigm(),
                adapter.paradigm()
            ),
        ));
    }
    if !adapter.valid_responses(trial).contains(&trial.correct_response) {
        return Err(EngineError::invalid_config(
            field(),
            format!("correct response '{}' is not a valid key", trial.correct_response),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paradigm::PosnerTask;
    use crate::sequence::{ParadigmParams, generate};
    use cogex_core::Paradigm;
    use cogex_timing::ManualClock;

    fn posner_engine(clock: &ManualClock) -> TrialEngine<PosnerTask, ManualClock> {
        let trials = generate(&ParadigmParams::defaults(Paradigm::Posner), 2, Some(11)).unwrap();
        TrialEngine::new(ExperimentConfig::new(trials, vec![]), PosnerTask, clock.clone()).unwrap()
    }

    fn await_response(engine: &mut TrialEngine<PosnerTask, ManualClock>, clock: &ManualClock) {
        engine.start_practice().unwrap();
        clock.advance_ms(500);
        assert!(engine.tick().unwrap());
        assert_eq!(engine.current_phase(), EngineStage::AwaitingResponse);
    }

    #[test]
    fn invariant_violation_latches_the_engine() {
        let clock = ManualClock::new();
        let mut engine = posner_engine(&clock);
        await_response(&mut engine, &clock);

        engine.state.current_trial_index = 9;
        let key = engine.config.practice_trials[0].correct_response.clone();
        let err = engine.submit_response(&key, clock.now()).unwrap_err();
        assert!(matches!(err, EngineError::InvariantViolation(_)));

        assert_eq!(engine.fault(), Some(&err));
        assert_eq!(engine.state.outstanding(), 0);
        assert!(!engine.timer.is_pending());
        assert!(!engine.capture.is_open());
        assert_eq!(engine.tick().unwrap_err(), err);
        assert_eq!(engine.start_main_task().unwrap_err(), err);

        // reset clears the session but not the fault
        engine.reset();
        assert_eq!(engine.start_practice().unwrap_err(), err);
    }

    #[test]
    fn stray_timer_event_is_an_invariant_violation() {
        let clock = ManualClock::new();
        let mut engine = posner_engine(&clock);
        await_response(&mut engine, &clock);

        let result = engine.dispatch(TimerEvent::FeedbackElapsed);
        assert!(matches!(result, Err(EngineError::InvariantViolation(_))));
    }

    #[test]
    fn accepted_response_cancels_the_timeout() {
        let clock = ManualClock::new();
        let mut engine = posner_engine(&clock);
        await_response(&mut engine, &clock);
        let timeout = engine.state.pending_timer;

        clock.advance_ms(320);
        let key = engine.config.practice_trials[0].correct_response.clone();
        assert!(engine.submit_response(&key, clock.now()).unwrap().is_accepted());

        assert_ne!(engine.state.pending_timer, timeout);
        assert!(timeout.is_some_and(|t| !engine.timer.cancel(t)));
        assert_eq!(engine.state.timestamps.response_ns, Some(clock.now()));
        assert_eq!(engine.time_until_next_deadline(), Some(Duration::from_millis(500)));
    }
}
