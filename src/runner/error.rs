//! Transfer Error Types
//!
//! Errors surfaced by the runner state machine, the stores and the run
//! controller. Task-level failures live in `task::PipelineError`.

use thiserror::Error;

use super::state::TaskStep;

/// Transfer error types
///
/// Error codes are stable strings for the administrative read model.
#[derive(Error, Debug, Clone)]
pub enum TransferError {
    // === Validation Errors ===
    #[error("Rule not found: {0}")]
    RuleNotFound(String),

    #[error("Peer {peer} is not allowed by rule {rule}")]
    PeerNotAllowed { rule: String, peer: String },

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid transfer request: {0}")]
    InvalidRequest(String),

    // === State Machine Errors ===
    #[error("Transfer already finished: {0}")]
    AlreadyFinished(String),

    #[error("Invalid phase transition from {from} to {to}")]
    InvalidPhaseTransition { from: TaskStep, to: TaskStep },

    #[error("Operation requires phase {expected}, transfer is in {actual}")]
    WrongPhase { expected: TaskStep, actual: TaskStep },

    #[error("Transfer not found: {0}")]
    TransferNotFound(String),

    #[error("Transfer already active: {0}")]
    AlreadyActive(String),

    // === Persistence Errors ===
    #[error("Identity conflict on insert: {0}")]
    IdentityConflict(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Internal system error: {0}")]
    SystemError(String),
}

impl TransferError {
    /// Get the error code for the read model
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::RuleNotFound(_) => "RULE_NOT_FOUND",
            TransferError::PeerNotAllowed { .. } => "PEER_NOT_ALLOWED",
            TransferError::FileNotFound(_) => "FILE_NOT_FOUND",
            TransferError::InvalidRequest(_) => "INVALID_REQUEST",
            TransferError::AlreadyFinished(_) => "ALREADY_FINISHED",
            TransferError::InvalidPhaseTransition { .. } => "INVALID_PHASE_TRANSITION",
            TransferError::WrongPhase { .. } => "WRONG_PHASE",
            TransferError::TransferNotFound(_) => "TRANSFER_NOT_FOUND",
            TransferError::AlreadyActive(_) => "ALREADY_ACTIVE",
            TransferError::IdentityConflict(_) => "IDENTITY_CONFLICT",
            TransferError::DatabaseError(_) => "DATABASE_ERROR",
            TransferError::StorageError(_) => "STORAGE_ERROR",
            TransferError::SystemError(_) => "SYSTEM_ERROR",
        }
    }

    /// Business/validation errors halt the transfer and run error tasks;
    /// everything else is infrastructure.
    pub fn is_business(&self) -> bool {
        matches!(
            self,
            TransferError::RuleNotFound(_)
                | TransferError::PeerNotAllowed { .. }
                | TransferError::FileNotFound(_)
                | TransferError::InvalidRequest(_)
        )
    }
}

impl From<sqlx::Error> for TransferError {
    fn from(e: sqlx::Error) -> Self {
        TransferError::DatabaseError(e.to_string())
    }
}

impl From<std::io::Error> for TransferError {
    fn from(e: std::io::Error) -> Self {
        TransferError::StorageError(e.to_string())
    }
}

impl From<serde_json::Error> for TransferError {
    fn from(e: serde_json::Error) -> Self {
        TransferError::StorageError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            TransferError::RuleNotFound("r".into()).code(),
            "RULE_NOT_FOUND"
        );
        assert_eq!(
            TransferError::IdentityConflict("k".into()).code(),
            "IDENTITY_CONFLICT"
        );
    }

    #[test]
    fn test_business_classification() {
        assert!(
            TransferError::PeerNotAllowed {
                rule: "r".into(),
                peer: "p".into()
            }
            .is_business()
        );
        assert!(!TransferError::DatabaseError("down".into()).is_business());
    }

    #[test]
    fn test_display() {
        let err = TransferError::InvalidPhaseTransition {
            from: TaskStep::AllDone,
            to: TaskStep::PreTask,
        };
        assert_eq!(
            err.to_string(),
            "Invalid phase transition from ALLDONETASK to PRETASK"
        );
    }
}
