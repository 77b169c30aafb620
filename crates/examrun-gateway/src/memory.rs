//! In-process exam service.
//!
//! Holds exam definitions and executions in memory and grades submissions
//! with the same reconciler the review path uses. Backs the CLI's `memory`
//! backend and the lifecycle tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::instrument;
use uuid::Uuid;

use examrun_core::clock::Clock;
use examrun_core::deadline::compute_deadline;
use examrun_core::error::GatewayError;
use examrun_core::model::{
    Answers, ExamDefinition, ExamSummary, ExecutionId, ExecutionTicket, Question,
    SubmissionResult,
};
use examrun_core::reconcile::reconcile;
use examrun_core::traits::{ExamService, SubmissionGateway};

/// Default window after the deadline during which submissions are still
/// accepted (and flagged late).
pub const DEFAULT_GRACE_SECS: i64 = 60;

struct Execution {
    ticket: ExecutionTicket,
    deadline: DateTime<Utc>,
    result: Option<SubmissionResult>,
}

#[derive(Default)]
struct State {
    exams: HashMap<String, ExamDefinition>,
    executions: HashMap<ExecutionId, Execution>,
    by_participant: HashMap<(String, String), ExecutionId>,
}

/// An exam service that keeps everything in memory.
pub struct InMemoryExamService {
    clock: Arc<dyn Clock>,
    grace: Duration,
    state: Mutex<State>,
    submit_calls: AtomicU32,
}

impl InMemoryExamService {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            grace: Duration::seconds(DEFAULT_GRACE_SECS),
            state: Mutex::new(State::default()),
            submit_calls: AtomicU32::new(0),
        }
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn with_exam(self, exam: ExamDefinition) -> Self {
        self.add_exam(exam);
        self
    }

    pub fn with_exams(self, exams: impl IntoIterator<Item = ExamDefinition>) -> Self {
        for exam in exams {
            self.add_exam(exam);
        }
        self
    }

    pub fn add_exam(&self, exam: ExamDefinition) {
        self.state
            .lock()
            .unwrap()
            .exams
            .insert(exam.id.clone(), exam);
    }

    /// Number of `submit` calls received, including duplicates and refusals.
    pub fn submit_calls(&self) -> u32 {
        self.submit_calls.load(Ordering::Relaxed)
    }

    /// Number of executions with a stored result.
    pub fn accepted_count(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .executions
            .values()
            .filter(|e| e.result.is_some())
            .count()
    }

    pub fn stored_result(&self, execution_id: ExecutionId) -> Option<SubmissionResult> {
        self.state
            .lock()
            .unwrap()
            .executions
            .get(&execution_id)
            .and_then(|e| e.result.clone())
    }
}

fn validate_answers(exam: &ExamDefinition, answers: &Answers) -> Result<(), GatewayError> {
    for (&question_id, &option_id) in answers {
        let question = exam.question(question_id).ok_or_else(|| {
            GatewayError::Validation(format!(
                "question {question_id} is not part of exam {}",
                exam.id
            ))
        })?;
        if !question.has_option(option_id) {
            return Err(GatewayError::Validation(format!(
                "option {option_id} does not belong to question {question_id}"
            )));
        }
    }
    Ok(())
}

#[async_trait]
impl SubmissionGateway for InMemoryExamService {
    #[instrument(skip(self, answers), fields(answered = answers.len()))]
    async fn submit(
        &self,
        execution_id: ExecutionId,
        answers: &Answers,
    ) -> Result<SubmissionResult, GatewayError> {
        self.submit_calls.fetch_add(1, Ordering::Relaxed);
        let now = self.clock.now();

        let mut state = self.state.lock().unwrap();
        let State {
            exams, executions, ..
        } = &mut *state;

        let execution = executions
            .get_mut(&execution_id)
            .ok_or_else(|| GatewayError::NotFound(format!("execution {execution_id}")))?;

        if let Some(existing) = &execution.result {
            tracing::info!(%execution_id, "duplicate submission, returning stored result");
            return Ok(existing.clone());
        }

        if now > execution.deadline + self.grace {
            tracing::warn!(
                %execution_id,
                deadline = %execution.deadline,
                "submission refused after grace period"
            );
            return Err(GatewayError::Conflict(format!(
                "deadline {} has passed",
                execution.deadline
            )));
        }

        let exam = exams.get(&execution.ticket.exam_id).ok_or_else(|| {
            GatewayError::NotFound(format!("exam {}", execution.ticket.exam_id))
        })?;
        validate_answers(exam, answers)?;

        let reconciliation = reconcile(&exam.questions, answers, exam.passing);
        let late = now > execution.deadline;
        let result = SubmissionResult {
            id: Uuid::new_v4(),
            execution_id,
            exam_id: exam.id.clone(),
            participant_id: execution.ticket.participant_id.clone(),
            score: reconciliation.aggregate.score,
            total_marks: reconciliation.aggregate.total_marks,
            correctness: reconciliation.correctness(),
            answers: answers.clone(),
            submitted_at: now,
            late,
        };

        tracing::info!(
            %execution_id,
            score = result.score,
            total_marks = result.total_marks,
            late,
            "submission stored"
        );
        execution.result = Some(result.clone());
        Ok(result)
    }
}

#[async_trait]
impl ExamService for InMemoryExamService {
    #[instrument(skip(self))]
    async fn start_execution(
        &self,
        exam_id: &str,
        participant_id: &str,
    ) -> Result<ExecutionTicket, GatewayError> {
        let now = self.clock.now();
        let mut state = self.state.lock().unwrap();

        let key = (exam_id.to_string(), participant_id.to_string());
        if let Some(existing) = state.by_participant.get(&key) {
            if let Some(execution) = state.executions.get(existing) {
                tracing::info!(execution_id = %existing, "rejoining existing execution");
                return Ok(execution.ticket.clone());
            }
        }

        let exam = state
            .exams
            .get(exam_id)
            .ok_or_else(|| GatewayError::NotFound(format!("exam {exam_id}")))?;

        if exam.opens_at.is_some_and(|opens| opens > now) {
            return Err(GatewayError::Validation("exam has not opened yet".into()));
        }
        if exam.hard_deadline.is_some_and(|hard| hard <= now) {
            return Err(GatewayError::Conflict("exam window has closed".into()));
        }

        let deadline = compute_deadline(now, exam.allotted_duration_secs, exam.hard_deadline)
            .map_err(|e| GatewayError::Validation(e.to_string()))?;

        let ticket = ExecutionTicket {
            execution_id: Uuid::new_v4(),
            exam_id: exam.id.clone(),
            participant_id: participant_id.to_string(),
            started_at: now,
            allotted_duration_secs: exam.allotted_duration_secs,
            hard_deadline: exam.hard_deadline,
            questions: exam.questions.iter().map(Question::to_public).collect(),
        };

        tracing::info!(execution_id = %ticket.execution_id, %deadline, "execution started");
        state.by_participant.insert(key, ticket.execution_id);
        state.executions.insert(
            ticket.execution_id,
            Execution {
                ticket: ticket.clone(),
                deadline,
                result: None,
            },
        );
        Ok(ticket)
    }

    async fn fetch_execution_result(
        &self,
        execution_id: ExecutionId,
    ) -> Result<SubmissionResult, GatewayError> {
        let state = self.state.lock().unwrap();
        let execution = state
            .executions
            .get(&execution_id)
            .ok_or_else(|| GatewayError::NotFound(format!("execution {execution_id}")))?;
        execution
            .result
            .clone()
            .ok_or_else(|| GatewayError::NotReady(execution_id.to_string()))
    }

    async fn fetch_answer_key(&self, exam_id: &str) -> Result<Vec<Question>, GatewayError> {
        let state = self.state.lock().unwrap();
        state
            .exams
            .get(exam_id)
            .map(|exam| exam.questions.clone())
            .ok_or_else(|| GatewayError::NotFound(format!("exam {exam_id}")))
    }

    async fn fetch_exam(&self, exam_id: &str) -> Result<ExamSummary, GatewayError> {
        let state = self.state.lock().unwrap();
        state
            .exams
            .get(exam_id)
            .map(ExamDefinition::summary)
            .ok_or_else(|| GatewayError::NotFound(format!("exam {exam_id}")))
    }
}
