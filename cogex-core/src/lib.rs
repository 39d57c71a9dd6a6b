pub mod error;
pub mod phase;
pub mod stimulus;
pub mod trial;

pub use error::{EngineError, Result};
pub use phase::{EngineStage, ExperimentPhase};
pub use stimulus::{Direction, InkColor, Paradigm, StimulusPayload, keys};
pub use trial::{TIMEOUT_RESPONSE, TrialResult, TrialSpec};
