//! The `examrun review` command.

use std::path::PathBuf;

use anyhow::{Context, Result};

use examrun_core::model::SubmissionResult;
use examrun_core::parser;
use examrun_core::presentation::present;
use examrun_core::reconcile::reconcile_result;
use examrun_core::report::ReviewReport;

pub fn execute(exam_path: PathBuf, result_path: PathBuf, format: String) -> Result<()> {
    let exam = parser::parse_exam(&exam_path)?;

    let content = std::fs::read_to_string(&result_path)
        .with_context(|| format!("failed to read result from {}", result_path.display()))?;
    let result: SubmissionResult =
        serde_json::from_str(&content).context("failed to parse result JSON")?;

    anyhow::ensure!(
        result.exam_id == exam.id,
        "result belongs to exam '{}', not '{}'",
        result.exam_id,
        exam.id
    );

    let reconciliation = reconcile_result(&exam.questions, &result, exam.passing);
    let questions = present(&exam.questions, &reconciliation);
    let report = ReviewReport::new(
        exam.summary(),
        result,
        reconciliation,
        questions,
        chrono::Utc::now(),
    );

    if report.score_drifted() {
        eprintln!(
            "Warning: recorded score {} differs from reconciled score {}",
            report.result.score, report.reconciliation.aggregate.score
        );
    }

    match format.as_str() {
        "json" => {
            let json = serde_json::to_string_pretty(&report)?;
            println!("{json}");
        }
        "markdown" => {
            print!("{}", report.to_markdown());
        }
        _ => super::print_review(&report),
    }

    Ok(())
}
