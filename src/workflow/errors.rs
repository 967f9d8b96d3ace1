use thiserror::Error;

use super::types::TransientId;
use crate::store::StoreError;

/// Which workflow axis a request targeted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowAxis {
    Marshall,
    Alert,
}

impl std::fmt::Display for WorkflowAxis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowAxis::Marshall => f.write_str("marshallWorkflowLocation"),
            WorkflowAxis::Alert => f.write_str("alertWorkflowLocation"),
        }
    }
}

/// Errors surfaced by every triage operation. None of them are retried;
/// each aborts the request without side effects.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("`{value}` is not a valid {axis} list")]
    InvalidTarget { axis: WorkflowAxis, value: String },

    #[error("transient #{transient_id} cannot be moved to the `{to}` {axis}: {reason}")]
    InvalidTransition {
        transient_id: TransientId,
        axis: WorkflowAxis,
        to: String,
        reason: String,
    },

    #[error("transient #{transient_id} is not eligible: {reason}")]
    NotEligible {
        transient_id: TransientId,
        reason: String,
    },

    #[error("transient #{transient_id} not found")]
    NotFound { transient_id: TransientId },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("transient #{transient_id} was modified concurrently, request not applied")]
    Conflict { transient_id: TransientId },

    #[error("store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),
}

/// Flat error classification for the outer request layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidTarget,
    InvalidTransition,
    NotEligible,
    NotFound,
    ValidationError,
    Conflict,
    StoreUnavailable,
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::InvalidTarget { .. } => ErrorKind::InvalidTarget,
            WorkflowError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            WorkflowError::NotEligible { .. } => ErrorKind::NotEligible,
            WorkflowError::NotFound { .. } => ErrorKind::NotFound,
            WorkflowError::Validation(_) => ErrorKind::ValidationError,
            WorkflowError::Conflict { .. } => ErrorKind::Conflict,
            WorkflowError::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        WorkflowError::Validation(message.into())
    }
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { transient_id } => WorkflowError::Conflict { transient_id },
            StoreError::Missing { transient_id } => WorkflowError::NotFound { transient_id },
            other => WorkflowError::StoreUnavailable(other),
        }
    }
}
