use thiserror::Error;

use crate::services::{CollaboratorError, StoreError};

/// Errors surfaced by the engine to its immediate caller
#[derive(Debug, Error)]
pub enum EngineError {
    /// Another writer moved first; re-read and retry
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Entries are not compatible: {}", reasons.join("; "))]
    Ineligible { reasons: Vec<String> },

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("External dependency failed: {0}")]
    ExternalDependency(#[from] CollaboratorError),

    #[error("Storage error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { .. } | StoreError::MatchConflict(_) => {
                EngineError::Conflict(err.to_string())
            }
            StoreError::Duplicate(_) => EngineError::Validation(err.to_string()),
            StoreError::NotFound(what) => EngineError::NotFound(what),
            other => EngineError::Store(other),
        }
    }
}

impl From<validator::ValidationErrors> for EngineError {
    fn from(errors: validator::ValidationErrors) -> Self {
        EngineError::Validation(errors.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntryState;
    use uuid::Uuid;

    #[test]
    fn test_store_conflict_maps_to_conflict() {
        let err: EngineError = StoreError::Conflict {
            id: Uuid::new_v4(),
            expected: EntryState::Waiting,
            actual: EntryState::Proposed,
        }
        .into();

        assert!(matches!(err, EngineError::Conflict(_)));
    }

    #[test]
    fn test_ineligible_message_lists_reasons() {
        let err = EngineError::Ineligible {
            reasons: vec!["meeting types differ".to_string(), "no overlap".to_string()],
        };

        assert_eq!(
            err.to_string(),
            "Entries are not compatible: meeting types differ; no overlap"
        );
    }
}
