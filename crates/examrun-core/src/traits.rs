//! Collaborator contracts.
//!
//! The session engine consumes these async traits; `examrun-gateway`
//! provides the in-memory, HTTP, and mock implementations.

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::model::{Answers, ExamSummary, ExecutionId, ExecutionTicket, Question, SubmissionResult};

// ---------------------------------------------------------------------------
// Submission gateway
// ---------------------------------------------------------------------------

/// Accepts a finished session's answers and returns the persisted result.
///
/// Implementations must be idempotent per `execution_id`: once a submission
/// has been accepted, later calls return the original result unchanged.
#[async_trait]
pub trait SubmissionGateway: Send + Sync {
    async fn submit(
        &self,
        execution_id: ExecutionId,
        answers: &Answers,
    ) -> Result<SubmissionResult, GatewayError>;
}

// ---------------------------------------------------------------------------
// Exam service
// ---------------------------------------------------------------------------

/// The surrounding exam service, as seen by the engine.
#[async_trait]
pub trait ExamService: Send + Sync {
    /// Start (or rejoin) the participant's execution of an exam.
    ///
    /// Idempotent per `(exam_id, participant_id)`: an existing execution is
    /// returned instead of creating a second one.
    async fn start_execution(
        &self,
        exam_id: &str,
        participant_id: &str,
    ) -> Result<ExecutionTicket, GatewayError>;

    /// Fetch the persisted result. `NotReady` until the execution is submitted.
    async fn fetch_execution_result(
        &self,
        execution_id: ExecutionId,
    ) -> Result<SubmissionResult, GatewayError>;

    /// Questions with correctness flags. Only the reconciler uses this.
    async fn fetch_answer_key(&self, exam_id: &str) -> Result<Vec<Question>, GatewayError>;

    async fn fetch_exam(&self, exam_id: &str) -> Result<ExamSummary, GatewayError>;
}
