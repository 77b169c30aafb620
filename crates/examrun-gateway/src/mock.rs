//! Mock submission gateway for testing.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use examrun_core::error::GatewayError;
use examrun_core::model::{Answers, ExecutionId, SubmissionResult};
use examrun_core::traits::SubmissionGateway;

/// What the mock does on one `submit` call.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Accept (or return the stored result for a duplicate).
    Succeed,
    /// Fail without storing anything.
    Fail(GatewayError),
    /// Sleep, then behave like `Succeed`.
    Stall(Duration),
    /// Store the result, then report a transport error as if the response
    /// was lost on the way back.
    AcceptThenDrop,
}

/// A scripted submission gateway.
///
/// Each call pops the next behavior; once the script runs out every call
/// succeeds. Accepted results are delegated to an inner gateway when one is
/// set, otherwise a zero-score result is fabricated. Either way the first
/// accepted result per execution is returned for every later call.
pub struct MockGateway {
    script: Mutex<VecDeque<MockBehavior>>,
    inner: Option<Arc<dyn SubmissionGateway>>,
    accepted: Mutex<HashMap<ExecutionId, SubmissionResult>>,
    /// Number of calls made.
    call_count: AtomicU32,
    /// Answers received on the last call.
    last_answers: Mutex<Option<Answers>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            inner: None,
            accepted: Mutex::new(HashMap::new()),
            call_count: AtomicU32::new(0),
            last_answers: Mutex::new(None),
        }
    }

    /// Create a mock that replays `script` in order.
    pub fn scripted(script: impl IntoIterator<Item = MockBehavior>) -> Self {
        let mock = Self::new();
        mock.script.lock().unwrap().extend(script);
        mock
    }

    /// Delegate accepted submissions to `inner` (e.g. an in-memory service).
    pub fn wrapping(mut self, inner: Arc<dyn SubmissionGateway>) -> Self {
        self.inner = Some(inner);
        self
    }

    pub fn push(&self, behavior: MockBehavior) {
        self.script.lock().unwrap().push_back(behavior);
    }

    /// Get the number of calls made to this gateway.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Get the answers sent on the last call.
    pub fn last_answers(&self) -> Option<Answers> {
        self.last_answers.lock().unwrap().clone()
    }

    /// Number of distinct executions accepted.
    pub fn accepted_count(&self) -> usize {
        self.accepted.lock().unwrap().len()
    }

    async fn accept(
        &self,
        execution_id: ExecutionId,
        answers: &Answers,
    ) -> Result<SubmissionResult, GatewayError> {
        let existing = self.accepted.lock().unwrap().get(&execution_id).cloned();
        if let Some(existing) = existing {
            return Ok(existing);
        }

        let result = match &self.inner {
            Some(inner) => inner.submit(execution_id, answers).await?,
            None => SubmissionResult {
                id: Uuid::new_v4(),
                execution_id,
                exam_id: "mock".into(),
                participant_id: "mock".into(),
                score: 0,
                total_marks: 0,
                correctness: vec![],
                answers: answers.clone(),
                submitted_at: Utc::now(),
                late: false,
            },
        };

        Ok(self
            .accepted
            .lock()
            .unwrap()
            .entry(execution_id)
            .or_insert(result)
            .clone())
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SubmissionGateway for MockGateway {
    async fn submit(
        &self,
        execution_id: ExecutionId,
        answers: &Answers,
    ) -> Result<SubmissionResult, GatewayError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        *self.last_answers.lock().unwrap() = Some(answers.clone());

        let behavior = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(MockBehavior::Succeed);

        match behavior {
            MockBehavior::Succeed => self.accept(execution_id, answers).await,
            MockBehavior::Fail(err) => Err(err),
            MockBehavior::Stall(delay) => {
                tokio::time::sleep(delay).await;
                self.accept(execution_id, answers).await
            }
            MockBehavior::AcceptThenDrop => {
                self.accept(execution_id, answers).await?;
                Err(GatewayError::Network("connection reset by peer".into()))
            }
        }
    }
}
