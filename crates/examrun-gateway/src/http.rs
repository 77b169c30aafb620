//! HTTP exam service client.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use examrun_core::error::GatewayError;
use examrun_core::model::{
    Answers, ExamSummary, ExecutionId, ExecutionTicket, Question, SubmissionResult,
};
use examrun_core::traits::{ExamService, SubmissionGateway};

const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Talks to a remote exam service over JSON/HTTP.
pub struct HttpExamService {
    base_url: String,
    api_token: Option<String>,
    client: reqwest::Client,
    timeout_ms: u64,
}

impl std::fmt::Debug for HttpExamService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpExamService")
            .field("base_url", &self.base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "***"))
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

impl HttpExamService {
    pub fn new(base_url: &str, api_token: Option<String>) -> anyhow::Result<Self> {
        Self::with_timeout(base_url, api_token, Duration::from_millis(DEFAULT_TIMEOUT_MS))
    }

    pub fn with_timeout(
        base_url: &str,
        api_token: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.filter(|t| !t.is_empty()),
            client,
            timeout_ms: timeout.as_millis() as u64,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{path}", self.base_url));
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, GatewayError> {
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Timeout(self.timeout_ms)
            } else {
                GatewayError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiError>(&body)
                .map(|e| e.message)
                .unwrap_or(body);
            return Err(match status {
                400 | 422 => GatewayError::Validation(message),
                401 | 403 => GatewayError::Validation(format!("unauthorized: {message}")),
                404 => GatewayError::NotFound(message),
                409 => GatewayError::Conflict(message),
                _ => GatewayError::Network(format!("HTTP {status}: {message}")),
            });
        }

        response.json::<T>().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Timeout(self.timeout_ms)
            } else {
                GatewayError::Network(format!("failed to parse response: {e}"))
            }
        })
    }
}

#[derive(Serialize)]
struct StartRequest<'a> {
    exam_id: &'a str,
    participant_id: &'a str,
}

#[derive(Serialize)]
struct SubmitRequest<'a> {
    answers: &'a Answers,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

#[async_trait]
impl SubmissionGateway for HttpExamService {
    #[instrument(skip(self, answers), fields(answered = answers.len()))]
    async fn submit(
        &self,
        execution_id: ExecutionId,
        answers: &Answers,
    ) -> Result<SubmissionResult, GatewayError> {
        let builder = self
            .request(Method::POST, &format!("/api/executions/{execution_id}/submit"))
            .header("Idempotency-Key", execution_id.to_string())
            .json(&SubmitRequest { answers });
        self.send(builder).await
    }
}

#[async_trait]
impl ExamService for HttpExamService {
    #[instrument(skip(self))]
    async fn start_execution(
        &self,
        exam_id: &str,
        participant_id: &str,
    ) -> Result<ExecutionTicket, GatewayError> {
        let builder = self.request(Method::POST, "/api/executions").json(&StartRequest {
            exam_id,
            participant_id,
        });
        self.send(builder).await
    }

    #[instrument(skip(self))]
    async fn fetch_execution_result(
        &self,
        execution_id: ExecutionId,
    ) -> Result<SubmissionResult, GatewayError> {
        let builder = self.request(Method::GET, &format!("/api/executions/{execution_id}/result"));
        self.send(builder).await.map_err(|e| match e {
            GatewayError::Conflict(message) => GatewayError::NotReady(message),
            other => other,
        })
    }

    #[instrument(skip(self))]
    async fn fetch_answer_key(&self, exam_id: &str) -> Result<Vec<Question>, GatewayError> {
        let builder = self.request(Method::GET, &format!("/api/exams/{exam_id}/answer-key"));
        self.send(builder).await
    }

    #[instrument(skip(self))]
    async fn fetch_exam(&self, exam_id: &str) -> Result<ExamSummary, GatewayError> {
        let builder = self.request(Method::GET, &format!("/api/exams/{exam_id}"));
        self.send(builder).await
    }
}
