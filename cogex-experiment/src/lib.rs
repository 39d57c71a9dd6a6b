pub mod capture;
pub mod config;
pub mod engine;
pub mod events;
pub mod paradigm;
pub mod persistence;
pub mod recorder;
pub mod sequence;
pub mod state;
pub mod summary;
pub mod trial;

pub use capture::{CaptureError, CaptureHandle, CaptureOutcome, CapturedResponse, IgnoreReason, ResponseCapture};
pub use config::{ExperimentConfig, ExperimentPlan, IMPLICIT_RESPONSE_CAP_MS, TimingConfig};
pub use engine::TrialEngine;
pub use events::{EngineEvent, EngineObserver, EventLog};
pub use paradigm::{ParadigmAdapter, StimulusFrame, adapter_for};
pub use persistence::{
    JsonFileStore, KeyValueStore, MemoryStore, NullPersistence, Persistence, PersistenceError,
    SaveOutcome, SessionBatch, SessionRecord,
};
pub use recorder::ResultRecorder;
pub use sequence::{ParadigmParams, generate};
pub use state::EngineState;
pub use summary::{ConditionSummary, SessionSummary};
pub use trial::{TrialDurations, TrialTimestamps};
