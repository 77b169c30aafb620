//! Execution session state machine.
//!
//! A session owns the countdown, the buffered answers, and the single
//! transition out of `InProgress`. Expiry is always decided by comparing the
//! injected [`Clock`] against the deadline; the tick loop only decides *when*
//! to look.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::instrument;

use crate::clock::Clock;
use crate::deadline::compute_deadline;
use crate::error::{FailureReason, SessionError};
use crate::model::{
    Answers, ExecutionId, ExecutionTicket, OptionId, PublicQuestion, QuestionId, SubmissionResult,
};
use crate::traits::SubmissionGateway;

/// Completes when the countdown loop exits, either after auto-submitting or
/// on cancellation.
pub type CountdownHandle = JoinHandle<()>;

/// Tunables for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How often the countdown re-evaluates the clock.
    pub tick_interval: Duration,
    /// Upper bound on a single gateway call.
    pub submit_timeout: Duration,
    /// Explicit retries allowed after a transient submission failure.
    pub max_manual_retries: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            submit_timeout: Duration::from_secs(10),
            max_manual_retries: 1,
        }
    }
}

/// What started a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitTrigger {
    Manual,
    Expiry,
    Retry,
}

impl fmt::Display for SubmitTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitTrigger::Manual => write!(f, "manual"),
            SubmitTrigger::Expiry => write!(f, "expiry"),
            SubmitTrigger::Retry => write!(f, "retry"),
        }
    }
}

/// Observable state of a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionStatus {
    InProgress,
    /// The deadline has passed but no submission has started yet, e.g. the
    /// countdown was torn down. Answers are frozen; resuming auto-submits.
    Expired,
    Submitting(SubmitTrigger),
    Submitted(SubmissionResult),
    Failed(FailureReason),
}

impl SessionStatus {
    /// `Submitted` and `Failed` are terminal; only an explicit retry leaves `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Submitted(_) | SessionStatus::Failed(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Expired => "expired",
            SessionStatus::Submitting(_) => "submitting",
            SessionStatus::Submitted(_) => "submitted",
            SessionStatus::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Read side of the "warn before leaving" flag.
///
/// Active exactly while the session is in progress.
#[derive(Debug, Clone)]
pub struct LeaveWarning(Arc<AtomicBool>);

impl LeaveWarning {
    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Holds the leave warning up; dropping it clears the flag.
#[derive(Debug)]
struct NavigationGuard {
    execution_id: ExecutionId,
    active: Arc<AtomicBool>,
}

impl NavigationGuard {
    fn arm(execution_id: ExecutionId) -> Self {
        Self {
            execution_id,
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    fn warning(&self) -> LeaveWarning {
        LeaveWarning(Arc::clone(&self.active))
    }
}

impl Drop for NavigationGuard {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
        tracing::debug!(execution_id = %self.execution_id, "leave warning released");
    }
}

/// One participant's live attempt at an exam.
pub struct ExecutionSession {
    ticket: ExecutionTicket,
    deadline: DateTime<Utc>,
    clock: Arc<dyn Clock>,
    gateway: Arc<dyn SubmissionGateway>,
    config: SessionConfig,
    /// Current status. `send_if_modified` on this channel is the transition guard.
    status: watch::Sender<SessionStatus>,
    answers: Mutex<Answers>,
    retries_used: Mutex<u32>,
    remaining: watch::Sender<Duration>,
    countdown: Mutex<Option<watch::Sender<bool>>>,
    navigation: Mutex<Option<NavigationGuard>>,
    leave_warning: LeaveWarning,
}

impl fmt::Debug for ExecutionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionSession")
            .field("execution_id", &self.ticket.execution_id)
            .field("exam_id", &self.ticket.exam_id)
            .field("deadline", &self.deadline)
            .field("status", &*self.status.borrow())
            .finish()
    }
}

impl ExecutionSession {
    /// Build a session from a start ticket.
    ///
    /// Fails with `InvalidDuration` before anything is created if the ticket's
    /// allotted duration is not positive.
    pub fn new(
        ticket: ExecutionTicket,
        clock: Arc<dyn Clock>,
        gateway: Arc<dyn SubmissionGateway>,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let deadline = compute_deadline(
            ticket.started_at,
            ticket.allotted_duration_secs,
            ticket.hard_deadline,
        )?;

        let initial_remaining = (deadline - clock.now()).to_std().unwrap_or(Duration::ZERO);
        let guard = NavigationGuard::arm(ticket.execution_id);
        let leave_warning = guard.warning();

        tracing::info!(
            execution_id = %ticket.execution_id,
            exam_id = %ticket.exam_id,
            %deadline,
            "execution session created"
        );

        Ok(Self {
            ticket,
            deadline,
            clock,
            gateway,
            config,
            status: watch::Sender::new(SessionStatus::InProgress),
            answers: Mutex::new(Answers::new()),
            retries_used: Mutex::new(0),
            remaining: watch::Sender::new(initial_remaining),
            countdown: Mutex::new(None),
            navigation: Mutex::new(Some(guard)),
            leave_warning,
        })
    }

    pub fn execution_id(&self) -> ExecutionId {
        self.ticket.execution_id
    }

    pub fn ticket(&self) -> &ExecutionTicket {
        &self.ticket
    }

    pub fn questions(&self) -> &[PublicQuestion] {
        &self.ticket.questions
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }

    /// Time left before the deadline, never negative.
    pub fn remaining(&self) -> Duration {
        (self.deadline - self.clock.now())
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    fn is_past_deadline(&self) -> bool {
        self.clock.now() >= self.deadline
    }

    pub fn status(&self) -> SessionStatus {
        let status = self.status.borrow().clone();
        if status == SessionStatus::InProgress && self.is_past_deadline() {
            SessionStatus::Expired
        } else {
            status
        }
    }

    /// Status updates. `Expired` is never published here; it is derived from
    /// the clock in [`status`](Self::status).
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    /// Remaining time as last published by the countdown.
    pub fn subscribe_remaining(&self) -> watch::Receiver<Duration> {
        self.remaining.subscribe()
    }

    /// Whether leaving the session should be confirmed by the participant.
    pub fn navigation_guarded(&self) -> bool {
        self.leave_warning.is_active()
    }

    pub fn leave_warning(&self) -> LeaveWarning {
        self.leave_warning.clone()
    }

    pub fn answers(&self) -> Answers {
        self.answers.lock().unwrap().clone()
    }

    // -----------------------------------------------------------------------
    // Answer capture
    // -----------------------------------------------------------------------

    fn validate_selection(
        &self,
        question_id: QuestionId,
        option_id: OptionId,
    ) -> Result<(), SessionError> {
        let question = self
            .ticket
            .questions
            .iter()
            .find(|q| q.id == question_id)
            .ok_or(SessionError::UnknownQuestion(question_id))?;
        if !question.has_option(option_id) {
            return Err(SessionError::UnknownOption {
                question_id,
                option_id,
            });
        }
        Ok(())
    }

    /// Run `edit` on the answer map while the session is still accepting
    /// answers. The status read lock is held across the edit so a concurrent
    /// submission either sees the edit in its snapshot or rejects it.
    fn edit_answers(&self, edit: impl FnOnce(&mut Answers)) -> Result<(), SessionError> {
        let status = self.status.borrow();
        if *status != SessionStatus::InProgress {
            return Err(SessionError::NotInProgress(status.clone()));
        }
        if self.is_past_deadline() {
            return Err(SessionError::NotInProgress(SessionStatus::Expired));
        }
        edit(&mut self.answers.lock().unwrap());
        Ok(())
    }

    /// Record a selection. Last write wins per question.
    pub fn select_answer(
        &self,
        question_id: QuestionId,
        option_id: OptionId,
    ) -> Result<(), SessionError> {
        self.validate_selection(question_id, option_id)?;
        self.edit_answers(|answers| {
            answers.insert(question_id, option_id);
        })
    }

    pub fn clear_answer(&self, question_id: QuestionId) -> Result<(), SessionError> {
        if !self.ticket.questions.iter().any(|q| q.id == question_id) {
            return Err(SessionError::UnknownQuestion(question_id));
        }
        self.edit_answers(|answers| {
            answers.remove(&question_id);
        })
    }

    /// Reload previously buffered selections, e.g. after a client restart.
    /// Nothing is applied if any selection is invalid.
    pub fn restore_answers(&self, restored: &Answers) -> Result<(), SessionError> {
        for (&question_id, &option_id) in restored {
            self.validate_selection(question_id, option_id)?;
        }
        self.edit_answers(|answers| {
            answers.extend(restored.iter().map(|(q, o)| (*q, *o)));
        })
    }

    // -----------------------------------------------------------------------
    // Termination
    // -----------------------------------------------------------------------

    /// Move `InProgress → Submitting` and snapshot the answers.
    ///
    /// Exactly one caller wins; everyone else gets `NotInProgress`.
    fn begin_submission(&self, trigger: SubmitTrigger) -> Result<Answers, SessionError> {
        let mut snapshot = None;
        let mut current = None;

        self.status.send_if_modified(|status| {
            if *status != SessionStatus::InProgress {
                current = Some(status.clone());
                return false;
            }
            snapshot = Some(self.answers.lock().unwrap().clone());
            *status = SessionStatus::Submitting(trigger);
            true
        });

        let Some(answers) = snapshot else {
            let status = current.unwrap_or(SessionStatus::InProgress);
            return Err(SessionError::NotInProgress(status));
        };

        self.stop_countdown();
        self.navigation.lock().unwrap().take();

        tracing::info!(
            execution_id = %self.ticket.execution_id,
            %trigger,
            answered = answers.len(),
            "submission started"
        );
        Ok(answers)
    }

    /// Call the gateway once and settle into `Submitted` or `Failed`.
    async fn dispatch(&self, answers: Answers) -> Result<SubmissionResult, SessionError> {
        let execution_id = self.ticket.execution_id;
        let outcome = tokio::time::timeout(
            self.config.submit_timeout,
            self.gateway.submit(execution_id, &answers),
        )
        .await;

        let settled = match outcome {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => Err(FailureReason::from_gateway(&e)),
            Err(_) => Err(FailureReason::UnknownOutcome),
        };

        match settled {
            Ok(result) => {
                tracing::info!(
                    %execution_id,
                    score = result.score,
                    total_marks = result.total_marks,
                    "submission accepted"
                );
                self.status
                    .send_replace(SessionStatus::Submitted(result.clone()));
                Ok(result)
            }
            Err(reason) => {
                tracing::warn!(
                    %execution_id,
                    retryable = reason.is_retryable(),
                    "submission failed: {reason}"
                );
                self.status
                    .send_replace(SessionStatus::Failed(reason.clone()));
                Err(SessionError::SubmissionFailed(reason))
            }
        }
    }

    /// Submit the buffered answers on the participant's request.
    #[instrument(skip(self), fields(execution_id = %self.ticket.execution_id))]
    pub async fn submit(&self) -> Result<SubmissionResult, SessionError> {
        let answers = self.begin_submission(SubmitTrigger::Manual)?;
        self.dispatch(answers).await
    }

    /// Auto-submit if the deadline has passed.
    ///
    /// Returns `Ok(None)` when the deadline is still ahead or another trigger
    /// already moved the session out of `InProgress`.
    pub async fn check_expiry(&self) -> Result<Option<SubmissionResult>, SessionError> {
        if !self.is_past_deadline() {
            return Ok(None);
        }
        let answers = match self.begin_submission(SubmitTrigger::Expiry) {
            Ok(answers) => answers,
            Err(SessionError::NotInProgress(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        self.dispatch(answers).await.map(Some)
    }

    /// Re-issue the frozen answers after a retryable failure.
    ///
    /// Uses the same execution id so the gateway can de-duplicate.
    #[instrument(skip(self), fields(execution_id = %self.ticket.execution_id))]
    pub async fn retry(&self) -> Result<SubmissionResult, SessionError> {
        let mut refusal = None;
        let max_retries = self.config.max_manual_retries;

        self.status.send_if_modified(|status| {
            let SessionStatus::Failed(reason) = &*status else {
                refusal = Some(format!("session is {status}"));
                return false;
            };
            if !reason.is_retryable() {
                refusal = Some(reason.to_string());
                return false;
            }
            let mut used = self.retries_used.lock().unwrap();
            if *used >= max_retries {
                refusal = Some(format!("retry limit of {max_retries} reached"));
                return false;
            }
            *used += 1;
            *status = SessionStatus::Submitting(SubmitTrigger::Retry);
            true
        });

        if let Some(why) = refusal {
            return Err(SessionError::NotRetryable(why));
        }

        tracing::info!(execution_id = %self.ticket.execution_id, "retrying submission");
        let answers = self.answers();
        self.dispatch(answers).await
    }

    /// Wait until the session reaches a terminal state.
    pub async fn wait_until_settled(&self) -> SessionStatus {
        let mut rx = self.status.subscribe();
        let settled = rx
            .wait_for(SessionStatus::is_terminal)
            .await
            .map(|status| status.clone());
        settled.unwrap_or_else(|_| self.status())
    }

    // -----------------------------------------------------------------------
    // Countdown
    // -----------------------------------------------------------------------

    /// Spawn the tick loop. Replaces any countdown already running.
    ///
    /// The loop holds only a weak reference, so dropping the last handle to
    /// the session ends it without submitting.
    pub fn start_countdown(self: &Arc<Self>) -> Result<CountdownHandle, SessionError> {
        let status = self.status.borrow().clone();
        if status != SessionStatus::InProgress {
            return Err(SessionError::NotInProgress(status));
        }

        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        if let Some(previous) = self.countdown.lock().unwrap().replace(cancel_tx) {
            let _ = previous.send(true);
        }

        let weak: Weak<Self> = Arc::downgrade(self);
        let tick = self.config.tick_interval;
        let execution_id = self.ticket.execution_id;

        Ok(tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel_rx.changed() => {
                        tracing::debug!(%execution_id, "countdown cancelled");
                        break;
                    }
                    _ = interval.tick() => {
                        let Some(session) = weak.upgrade() else {
                            break;
                        };
                        let remaining = session.remaining();
                        session.remaining.send_replace(remaining);
                        tracing::debug!(
                            %execution_id,
                            remaining_secs = remaining.as_secs(),
                            "tick"
                        );
                        if session.is_past_deadline() {
                            if let Err(e) = session.check_expiry().await {
                                tracing::warn!(%execution_id, "auto-submit failed: {e}");
                            }
                            break;
                        }
                    }
                }
            }
        }))
    }

    fn stop_countdown(&self) {
        if let Some(cancel) = self.countdown.lock().unwrap().take() {
            let _ = cancel.send(true);
        }
    }

    /// Detach the session: stop the countdown without submitting.
    pub fn teardown(&self) {
        self.stop_countdown();
        tracing::info!(execution_id = %self.ticket.execution_id, "session torn down");
    }

    /// Re-attach after a teardown. Remaining time is recomputed from the
    /// clock; a session whose deadline passed meanwhile submits right away.
    pub fn resume(self: &Arc<Self>) -> Result<CountdownHandle, SessionError> {
        tracing::info!(
            execution_id = %self.ticket.execution_id,
            remaining_secs = self.remaining().as_secs(),
            "session resumed"
        );
        self.start_countdown()
    }
}

impl Drop for ExecutionSession {
    fn drop(&mut self) {
        self.stop_countdown();
    }
}
