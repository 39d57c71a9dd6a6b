//! Typed event channel from the engine to its host.

use crate::paradigm::StimulusFrame;
use crate::persistence::SaveOutcome;
use cogex_core::{EngineStage, ExperimentPhase, TrialResult, TrialSpec};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    StageChanged {
        from: EngineStage,
        to: EngineStage,
        phase: Option<ExperimentPhase>,
    },
    TrialStarted {
        trial: TrialSpec,
        index: usize,
        phase: ExperimentPhase,
        frame: StimulusFrame,
        started_at_ns: u64,
    },
    ResponseCaptured {
        index: usize,
        phase: ExperimentPhase,
        response: String,
        timestamp_ns: u64,
    },
    ResponseTimedOut {
        index: usize,
        phase: ExperimentPhase,
    },
    TrialEnded {
        result: TrialResult,
        trial: TrialSpec,
        index: usize,
        phase: ExperimentPhase,
    },
    ResultSaved {
        index: usize,
        phase: ExperimentPhase,
        outcome: SaveOutcome,
    },
    PhaseCompleted {
        phase: ExperimentPhase,
        results: Arc<[TrialResult]>,
    },
    ExperimentCompleted {
        main_results: Arc<[TrialResult]>,
        practice_results: Arc<[TrialResult]>,
    },
    SessionFlushed {
        outcome: SaveOutcome,
    },
}

impl EngineEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            EngineEvent::StageChanged { .. } => "stage_changed",
            EngineEvent::TrialStarted { .. } => "trial_started",
            EngineEvent::ResponseCaptured { .. } => "response_captured",
            EngineEvent::ResponseTimedOut { .. } => "response_timed_out",
            EngineEvent::TrialEnded { .. } => "trial_ended",
            EngineEvent::ResultSaved { .. } => "result_saved",
            EngineEvent::PhaseCompleted { .. } => "phase_completed",
            EngineEvent::ExperimentCompleted { .. } => "experiment_completed",
            EngineEvent::SessionFlushed { .. } => "session_flushed",
        }
    }
}

/// Receives engine events synchronously. Implementations must return
/// promptly; the engine waits for nothing they start.
pub trait EngineObserver {
    fn on_event(&mut self, event: &EngineEvent);
}

impl<F: FnMut(&EngineEvent)> EngineObserver for F {
    fn on_event(&mut self, event: &EngineEvent) {
        self(event)
    }
}

/// Observer that keeps every event. Clones share the same log, so the host
/// can hand one clone to the engine and read from another.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Rc<RefCell<Vec<EngineEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.borrow().clone()
    }

    /// Removes and returns everything logged so far.
    pub fn drain(&self) -> Vec<EngineEvent> {
        self.events.borrow_mut().drain(..).collect()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.borrow().iter().map(EngineEvent::kind).collect()
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }
}

impl EngineObserver for EventLog {
    fn on_event(&mut self, event: &EngineEvent) {
        self.events.borrow_mut().push(event.clone());
    }
}
