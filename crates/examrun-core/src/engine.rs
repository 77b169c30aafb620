//! Exam engine orchestrator.
//!
//! Starts sessions against the exam service and builds review reports once an
//! execution has been submitted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tracing::instrument;

use crate::clock::Clock;
use crate::error::{GatewayError, SessionError};
use crate::model::ExecutionId;
use crate::presentation::present;
use crate::reconcile::reconcile_result;
use crate::report::ReviewReport;
use crate::session::{ExecutionSession, SessionConfig};
use crate::traits::{ExamService, SubmissionGateway};

/// Configuration for the exam engine.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Passed to every session the engine creates.
    pub session: SessionConfig,
}

impl EngineConfig {
    pub fn from_millis(
        tick_interval_ms: u64,
        submit_timeout_ms: u64,
        max_manual_retries: u32,
    ) -> Self {
        Self {
            session: SessionConfig {
                tick_interval: Duration::from_millis(tick_interval_ms),
                submit_timeout: Duration::from_millis(submit_timeout_ms),
                max_manual_retries,
            },
        }
    }
}

/// The central exam engine.
pub struct ExamEngine {
    service: Arc<dyn ExamService>,
    gateway: Arc<dyn SubmissionGateway>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    /// Sessions handed out and not yet dropped, keyed by execution.
    sessions: Mutex<HashMap<ExecutionId, Weak<ExecutionSession>>>,
}

impl ExamEngine {
    pub fn new(
        service: Arc<dyn ExamService>,
        gateway: Arc<dyn SubmissionGateway>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            service,
            gateway,
            clock,
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Start or rejoin an execution and wrap it in a session.
    ///
    /// While a session for the execution is still alive and not terminal, the
    /// same session is returned. The countdown is not started; call
    /// [`ExecutionSession::start_countdown`] once the session is displayed.
    #[instrument(skip(self))]
    pub async fn start(
        &self,
        exam_id: &str,
        participant_id: &str,
    ) -> Result<Arc<ExecutionSession>, SessionError> {
        let ticket = self
            .service
            .start_execution(exam_id, participant_id)
            .await
            .map_err(SessionError::Start)?;

        let execution_id = ticket.execution_id;
        let mut sessions = self.sessions.lock().unwrap();
        sessions.retain(|_, session| session.strong_count() > 0);

        if let Some(live) = sessions.get(&execution_id).and_then(Weak::upgrade) {
            if !live.status().is_terminal() {
                tracing::debug!(%execution_id, "rejoined live session");
                return Ok(live);
            }
        }

        let session = Arc::new(ExecutionSession::new(
            ticket,
            Arc::clone(&self.clock),
            Arc::clone(&self.gateway),
            self.config.session.clone(),
        )?);
        sessions.insert(execution_id, Arc::downgrade(&session));
        Ok(session)
    }

    /// Reconcile a submitted execution against the exam's answer key.
    ///
    /// Fails with `NotReady` until the execution has been submitted.
    #[instrument(skip(self), fields(%execution_id))]
    pub async fn review(
        &self,
        execution_id: ExecutionId,
        exam_id: &str,
    ) -> Result<ReviewReport, GatewayError> {
        let (result, answer_key, exam) = tokio::try_join!(
            self.service.fetch_execution_result(execution_id),
            self.service.fetch_answer_key(exam_id),
            self.service.fetch_exam(exam_id),
        )?;

        let reconciliation = reconcile_result(&answer_key, &result, exam.passing);
        if reconciliation.aggregate.score != result.score {
            tracing::warn!(
                recorded = result.score,
                reconciled = reconciliation.aggregate.score,
                "recorded score differs from reconciled score"
            );
        }
        let questions = present(&answer_key, &reconciliation);

        Ok(ReviewReport::new(
            exam,
            result,
            reconciliation,
            questions,
            self.clock.now(),
        ))
    }
}
