use serde::Serialize;

use super::draft::DraftError;
use super::validation::{FieldError, ValidationError};

/// Error surfaced at the controller boundary. Nothing here is fatal; every
/// variant leaves the controller in a stable step or in review.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("verification failed: {reason}")]
    VerificationFailure {
        reason: String,
        /// The caller may retry by typing the fields in by hand.
        fallback_to_manual: bool,
    },
    #[error("submission failed: {0}")]
    SubmissionFailure(String),
    #[error("operation already in flight: {0}")]
    ConcurrencyViolation(String),
    #[error("cannot {action} while {state}")]
    InvalidTransition { action: &'static str, state: &'static str },
    #[error("no draft is active")]
    NoActiveDraft,
    #[error(transparent)]
    Draft(#[from] DraftError),
    #[error("draft was closed before the operation finished")]
    Abandoned,
    #[error("financing session is no longer running")]
    SessionUnavailable,
}

impl WorkflowError {
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            WorkflowError::Validation(error) => &error.errors,
            _ => &[],
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error: self.to_string(),
            fields: self.field_errors().to_vec(),
            fallback_to_manual: matches!(
                self,
                WorkflowError::VerificationFailure {
                    fallback_to_manual: true,
                    ..
                }
            ),
        }
    }
}

/// JSON shape every workflow error is rendered as.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub fields: Vec<FieldError>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub fallback_to_manual: bool,
}
