//! Error taxonomy.
//!
//! Gateway errors are defined in `examrun-core` so the session can classify
//! them for retry decisions without string matching, whichever collaborator
//! produced them.

use thiserror::Error;

use crate::model::{OptionId, QuestionId};
use crate::session::SessionStatus;

/// Errors returned by exam service collaborators.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    /// Transport failure; the request may not have reached the service.
    #[error("network error: {0}")]
    Network(String),

    /// No response within the bounded wait. The outcome is unknown.
    #[error("request timed out after {0}ms")]
    Timeout(u64),

    /// The service refused the request because of its current state
    /// (deadline already passed, exam window closed).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The payload was rejected as malformed.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The execution has not been submitted yet.
    #[error("result not ready for execution {0}")]
    NotReady(String),
}

impl GatewayError {
    /// Returns `true` if re-issuing the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Network(_) | GatewayError::Timeout(_))
    }
}

/// Errors from the deadline calculator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeadlineError {
    #[error("allotted duration must be positive, got {0}s")]
    InvalidDuration(i64),
}

/// Why a submission ended in the `Failed` state.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// The request never completed; retry is available.
    Network(String),
    /// The wait timed out; the service may or may not have stored the result.
    UnknownOutcome,
    /// The deadline had passed server-side before the first accepted submission.
    TooLate(String),
    /// The service rejected the answers.
    Rejected(String),
}

impl FailureReason {
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureReason::Network(_) | FailureReason::UnknownOutcome)
    }

    pub(crate) fn from_gateway(err: &GatewayError) -> Self {
        match err {
            GatewayError::Network(msg) => FailureReason::Network(msg.clone()),
            GatewayError::Timeout(_) => FailureReason::UnknownOutcome,
            GatewayError::Conflict(msg) => FailureReason::TooLate(msg.clone()),
            GatewayError::Validation(msg)
            | GatewayError::NotFound(msg)
            | GatewayError::NotReady(msg) => FailureReason::Rejected(msg.clone()),
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::Network(msg) => write!(f, "submission failed, retry available: {msg}"),
            FailureReason::UnknownOutcome => {
                write!(f, "submission outcome unknown, retry is safe")
            }
            FailureReason::TooLate(msg) => write!(f, "submitted too late: {msg}"),
            FailureReason::Rejected(msg) => write!(f, "submission rejected: {msg}"),
        }
    }
}

/// Errors surfaced by an execution session.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Deadline(#[from] DeadlineError),

    #[error("unknown question {0}")]
    UnknownQuestion(QuestionId),

    #[error("option {option_id} does not belong to question {question_id}")]
    UnknownOption {
        question_id: QuestionId,
        option_id: OptionId,
    },

    /// The operation requires an in-progress session.
    #[error("session is not in progress (status: {0})")]
    NotInProgress(SessionStatus),

    #[error("{0}")]
    SubmissionFailed(FailureReason),

    /// Retry requested on a session that has no retryable failure left.
    #[error("retry not available: {0}")]
    NotRetryable(String),

    #[error("could not start execution: {0}")]
    Start(GatewayError),
}

impl SessionError {
    /// Validation errors leave the session in progress so the participant
    /// can correct the answer.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SessionError::UnknownQuestion(_) | SessionError::UnknownOption { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_errors_map_to_failure_reasons() {
        assert_eq!(
            FailureReason::from_gateway(&GatewayError::Timeout(500)),
            FailureReason::UnknownOutcome
        );
        assert!(matches!(
            FailureReason::from_gateway(&GatewayError::Conflict("late".into())),
            FailureReason::TooLate(_)
        ));
        assert!(FailureReason::from_gateway(&GatewayError::Network("reset".into())).is_retryable());
        assert!(!FailureReason::TooLate("x".into()).is_retryable());
        assert!(!FailureReason::Rejected("x".into()).is_retryable());
    }

    #[test]
    fn transient_classification() {
        assert!(GatewayError::Network("x".into()).is_transient());
        assert!(GatewayError::Timeout(1).is_transient());
        assert!(!GatewayError::Conflict("x".into()).is_transient());
        assert!(!GatewayError::NotReady("x".into()).is_transient());
    }

    #[test]
    fn display_messages() {
        assert_eq!(
            DeadlineError::InvalidDuration(0).to_string(),
            "allotted duration must be positive, got 0s"
        );
        assert_eq!(
            GatewayError::Timeout(250).to_string(),
            "request timed out after 250ms"
        );
    }
}
