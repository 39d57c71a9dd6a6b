//! Errors surfaced by the trial engine and its building blocks.

use crate::phase::EngineStage;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Malformed configuration, trial list or paradigm parameters.
    /// Fatal to the engine instance being built.
    #[error("invalid configuration for '{field}': {reason}")]
    InvalidConfig { field: String, reason: String },

    /// A lifecycle call made from a stage that does not permit it.
    /// Engine state is left untouched.
    #[error("cannot {operation} while the engine is in the '{stage}' stage")]
    InvalidTransition {
        operation: &'static str,
        stage: EngineStage,
    },

    /// Internal defect, e.g. two timers armed at once. Never expected in
    /// correct operation.
    #[error("engine invariant violated: {0}")]
    InvariantViolation(String),
}

impl EngineError {
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        EngineError::InvariantViolation(message.into())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_transition_names_the_stage() {
        let err = EngineError::InvalidTransition {
            operation: "start the main task",
            stage: EngineStage::Fixation,
        };
        assert_eq!(
            err.to_string(),
            "cannot start the main task while the engine is in the 'fixation' stage"
        );
    }

    #[test]
    fn invalid_config_display() {
        let err = EngineError::invalid_config("count", "must be at least 1");
        assert!(err.to_string().contains("count"));
        assert!(err.to_string().contains("at least 1"));
    }
}
