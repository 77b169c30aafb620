//! The `examrun take` command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use examrun_core::clock::{Clock, SystemClock};
use examrun_core::engine::ExamEngine;
use examrun_core::error::SessionError;
use examrun_core::model::{Answers, OptionId, QuestionId, SubmissionResult};
use examrun_core::parser;
use examrun_core::session::{ExecutionSession, SessionStatus};
use examrun_gateway::config::{create_backend, load_config_from};

/// Parse `"1=11, 2=21"` into selections.
pub fn parse_answers(input: &str) -> Result<Answers> {
    input
        .split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| -> Result<(QuestionId, OptionId)> {
            let (question, option) = pair
                .split_once('=')
                .with_context(|| format!("invalid answer '{pair}', expected question=option"))?;
            let question = question
                .trim()
                .parse::<QuestionId>()
                .with_context(|| format!("invalid question id in '{pair}'"))?;
            let option = option
                .trim()
                .parse::<OptionId>()
                .with_context(|| format!("invalid option id in '{pair}'"))?;
            Ok((question, option))
        })
        .collect()
}

#[allow(clippy::too_many_arguments)]
pub async fn execute(
    exam_path: PathBuf,
    participant: Option<String>,
    answers: Option<String>,
    wait_for_expiry: bool,
    retry: bool,
    output: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let exam = parser::parse_exam(&exam_path)?;
    for w in parser::validate_exam(&exam) {
        eprintln!("Warning: {}", w.message);
    }

    let participant = participant
        .or_else(|| config.participant_id.clone())
        .context("no participant given; pass --participant or set participant_id in config")?;
    let selections = answers.as_deref().map(parse_answers).transpose()?.unwrap_or_default();
    let output = output.unwrap_or_else(|| config.output_dir.clone());

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let backend = create_backend(&config, Arc::clone(&clock), vec![exam.clone()])?;
    let engine = ExamEngine::new(
        backend.service,
        backend.gateway,
        clock,
        config.engine_config(),
    );

    tracing::info!(exam_id = %exam.id, %participant, "starting exam");
    let session = engine.start(&exam.id, &participant).await?;
    eprintln!(
        "examrun v{}: {} ({} questions), {}s remaining",
        env!("CARGO_PKG_VERSION"),
        exam.title,
        session.questions().len(),
        session.remaining().as_secs()
    );

    for (&question_id, &option_id) in &selections {
        if let Err(e) = session.select_answer(question_id, option_id) {
            eprintln!("  Skipped {question_id}={option_id}: {e}");
        }
    }

    let result = finish(&session, wait_for_expiry, retry).await?;
    eprintln!(
        "Submitted: {}/{}{}",
        result.score,
        result.total_marks,
        if result.late { " (late)" } else { "" }
    );

    std::fs::create_dir_all(&output)
        .with_context(|| format!("failed to create {}", output.display()))?;
    let result_path = output.join(format!("result-{}.json", result.execution_id));
    let json = serde_json::to_string_pretty(&result).context("failed to serialize result")?;
    std::fs::write(&result_path, json)
        .with_context(|| format!("failed to write result to {}", result_path.display()))?;
    eprintln!("Result saved to: {}", result_path.display());

    let report = engine.review(result.execution_id, &exam.id).await?;
    super::print_review(&report);

    let review_path = output.join(format!("review-{}.json", result.execution_id));
    report.save_json(&review_path)?;
    eprintln!("Review saved to: {}", review_path.display());

    Ok(())
}

/// Drive the session to a terminal state and return the accepted result.
async fn finish(
    session: &Arc<ExecutionSession>,
    wait_for_expiry: bool,
    retry: bool,
) -> Result<SubmissionResult> {
    let outcome = if wait_for_expiry {
        eprintln!("Waiting for time to run out...");
        let _countdown = session.start_countdown()?;
        match session.wait_until_settled().await {
            SessionStatus::Submitted(result) => Ok(result),
            SessionStatus::Failed(reason) => Err(SessionError::SubmissionFailed(reason)),
            other => Err(SessionError::NotInProgress(other)),
        }
    } else {
        session.submit().await
    };

    match outcome {
        Ok(result) => Ok(result),
        Err(SessionError::SubmissionFailed(reason)) if retry && reason.is_retryable() => {
            eprintln!("{reason}; retrying");
            Ok(session.retry().await?)
        }
        Err(e) => Err(e.into()),
    }
}
