//! Error types for the onboarding engine.

use crate::onboarding::catalog::StageId;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Failures of onboarding operations.
///
/// Every variant is a local validation failure. The `Display` text is meant
/// to be shown to the partner or the reviewing team as-is.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("unknown stage: {0}")]
    UnknownStage(String),

    #[error("document '{document}' is not part of the {stage} checklist")]
    UnknownDocument { stage: StageId, document: String },

    #[error("team '{team}' does not approve the {stage} stage")]
    UnknownTeam { stage: StageId, team: String },

    #[error("document '{document}' is already approved")]
    AlreadyTerminal { stage: StageId, document: String },

    #[error("cannot skip a required document: {document}")]
    CannotSkipRequired { stage: StageId, document: String },

    #[error("the {0} stage is not complete yet")]
    StageNotComplete(StageId),

    #[error("the {0} stage cannot be skipped")]
    CannotSkipStage(StageId),

    #[error("no onboarding session exists for partner {0}")]
    SessionNotFound(String),

    #[error("persisted onboarding session is invalid: {0}")]
    InvalidPersistedState(String),

    #[error("onboarding is already complete")]
    SessionCompleted,

    #[error("failed to persist onboarding session: {0}")]
    Persistence(#[from] DatabaseError),

    #[error("failed to store document: {0}")]
    DocumentStorage(#[from] PortError),
}

impl WorkflowError {
    /// Whether this failure means the caller addressed something that does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::UnknownStage(_)
                | Self::UnknownDocument { .. }
                | Self::UnknownTeam { .. }
                | Self::SessionNotFound(_)
        )
    }
}

/// Failures reported by external collaborators (notification fan-out, file storage).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("delivery to {target} failed: {reason}")]
    Delivery { target: String, reason: String },

    #[error("document storage failed: {0}")]
    Storage(String),
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_display_ready() {
        let err = WorkflowError::CannotSkipRequired {
            stage: StageId::Kyc,
            document: "aml_policy".to_string(),
        };
        assert_eq!(err.to_string(), "cannot skip a required document: aml_policy");

        let err = WorkflowError::StageNotComplete(StageId::GoLive);
        assert_eq!(err.to_string(), "the go-live stage is not complete yet");
    }

    #[test]
    fn not_found_classification() {
        assert!(WorkflowError::SessionNotFound("p1".into()).is_not_found());
        assert!(WorkflowError::UnknownStage("x".into()).is_not_found());
        assert!(!WorkflowError::SessionCompleted.is_not_found());
        assert!(!WorkflowError::CannotSkipStage(StageId::Nda).is_not_found());
    }

    #[test]
    fn database_error_converts() {
        let err: WorkflowError = DatabaseError::Query("boom".into()).into();
        assert!(matches!(err, WorkflowError::Persistence(_)));
        let top: Error = err.into();
        assert!(top.to_string().contains("boom"));
    }
}
