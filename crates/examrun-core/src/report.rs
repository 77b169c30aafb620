//! Review report with JSON persistence.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{ExamSummary, ExecutionId, SubmissionResult};
use crate::presentation::{Badge, Highlight, QuestionView};
use crate::reconcile::Reconciliation;

/// Everything needed to show a participant how their execution went.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewReport {
    /// Unique report identifier.
    pub id: Uuid,
    /// When the report was created.
    pub created_at: DateTime<Utc>,
    pub execution_id: ExecutionId,
    /// Exam metadata (without questions).
    pub exam: ExamSummary,
    /// The persisted result as returned by the exam service.
    pub result: SubmissionResult,
    /// Scoring against the answer key.
    pub reconciliation: Reconciliation,
    /// Per-question display state, in exam order.
    pub questions: Vec<QuestionView>,
}

impl ReviewReport {
    pub fn new(
        exam: ExamSummary,
        result: SubmissionResult,
        reconciliation: Reconciliation,
        questions: Vec<QuestionView>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at,
            execution_id: result.execution_id,
            exam,
            result,
            reconciliation,
            questions,
        }
    }

    /// Whether the score recorded at submission time differs from the
    /// reconciled score, e.g. because the answer key was corrected since.
    pub fn score_drifted(&self) -> bool {
        self.result.score != self.reconciliation.aggregate.score
    }

    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: ReviewReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }

    /// Format the review as markdown.
    pub fn to_markdown(&self) -> String {
        let aggregate = &self.reconciliation.aggregate;
        let mut md = String::new();

        md.push_str(&format!("## {}\n\n", self.exam.title));
        md.push_str(&format!(
            "**Score:** {}/{} ({:.1}%), {}, {}\n\n",
            aggregate.score,
            aggregate.total_marks,
            aggregate.percentage,
            if aggregate.passed { "passed" } else { "not passed" },
            aggregate.feedback
        ));
        if self.result.late {
            md.push_str("_Submitted during the grace period._\n\n");
        }
        for issue in &aggregate.integrity_issues {
            md.push_str(&format!("> Excluded: {issue}\n"));
        }
        if aggregate.has_integrity_issues() {
            md.push('\n');
        }

        for question in &self.questions {
            md.push_str(&format!(
                "### Q{} [{}] {}/{}\n\n{}\n\n",
                question.question_id,
                badge_label(question.badge),
                question.marks_awarded,
                question.marks,
                question.text
            ));
            for option in &question.options {
                let marker = match option.highlight {
                    Highlight::CorrectAnswer => "✔",
                    Highlight::ParticipantChoiceWrong => "✘",
                    Highlight::Neutral => " ",
                };
                let chosen = if option.selected { " (your answer)" } else { "" };
                md.push_str(&format!("- [{marker}] {}{chosen}\n", option.text));
            }
            md.push('\n');
        }

        md
    }
}

pub fn badge_label(badge: Badge) -> &'static str {
    match badge {
        Badge::Correct => "correct",
        Badge::Incorrect => "incorrect",
        Badge::Unanswered => "unanswered",
        Badge::Excluded => "excluded",
    }
}
