//! Core data model types for examrun.
//!
//! These are the types shared by the session engine, the reconciler, and the
//! exam service collaborators: questions with their answer key, execution
//! tickets handed out at start time, and the persisted submission result.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a question within an exam.
pub type QuestionId = u64;

/// Identifier of an option within a question.
pub type OptionId = u64;

/// Identifier of one participant's attempt at one exam.
pub type ExecutionId = Uuid;

/// Buffered selections, question → selected option.
///
/// Ordered so that serialized payloads and reconciled output are stable.
pub type Answers = BTreeMap<QuestionId, OptionId>;

/// A multiple-choice question including its answer key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub text: String,
    #[serde(default)]
    pub image_url: Option<String>,
    /// Marks awarded for a correct answer. Must be positive.
    pub marks: u32,
    /// Options in display order.
    pub options: Vec<AnswerOption>,
}

impl Question {
    /// Options flagged as correct. A well-formed question has exactly one.
    pub fn correct_options(&self) -> impl Iterator<Item = &AnswerOption> {
        self.options.iter().filter(|o| o.is_correct)
    }

    pub fn has_option(&self, option_id: OptionId) -> bool {
        self.options.iter().any(|o| o.id == option_id)
    }

    /// Strip the correctness flags for display during a live session.
    pub fn to_public(&self) -> PublicQuestion {
        PublicQuestion {
            id: self.id,
            text: self.text.clone(),
            image_url: self.image_url.clone(),
            marks: self.marks,
            options: self
                .options
                .iter()
                .map(|o| PublicOption {
                    id: o.id,
                    text: o.text.clone(),
                    image_url: o.image_url.clone(),
                })
                .collect(),
        }
    }
}

/// One option of a question, with its correctness flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerOption {
    pub id: OptionId,
    pub text: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default, rename = "isCorrect", alias = "is_correct")]
    pub is_correct: bool,
}

/// A question as shown to a participant while the session is in progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicQuestion {
    pub id: QuestionId,
    pub text: String,
    #[serde(default)]
    pub image_url: Option<String>,
    pub marks: u32,
    pub options: Vec<PublicOption>,
}

impl PublicQuestion {
    pub fn has_option(&self, option_id: OptionId) -> bool {
        self.options.iter().any(|o| o.id == option_id)
    }
}

/// An option without its correctness flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicOption {
    pub id: OptionId,
    pub text: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// How a pass is decided for an exam.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PassingThreshold {
    /// Absolute marks required.
    Marks(u32),
    /// Percentage of the scored total required.
    Percent(f64),
}

impl PassingThreshold {
    /// Returns `true` if `score` out of `total_marks` meets the threshold.
    pub fn is_met(&self, score: u32, total_marks: u32) -> bool {
        match *self {
            PassingThreshold::Marks(required) => score >= required,
            PassingThreshold::Percent(percent) => {
                if total_marks == 0 {
                    return false;
                }
                score as f64 * 100.0 >= percent * total_marks as f64
            }
        }
    }
}

impl Default for PassingThreshold {
    fn default() -> Self {
        PassingThreshold::Percent(50.0)
    }
}

impl fmt::Display for PassingThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassingThreshold::Marks(m) => write!(f, "{m} marks"),
            PassingThreshold::Percent(p) => write!(f, "{p}%"),
        }
    }
}

/// Sum of marks, saturating at `u32::MAX`.
pub fn sum_marks(marks: impl IntoIterator<Item = u32>) -> u32 {
    marks.into_iter().fold(0, u32::saturating_add)
}

/// A complete exam definition, as authored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamDefinition {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Time allotted to each participant, in seconds.
    pub allotted_duration_secs: i64,
    /// Absolute cutoff shared by all participants.
    #[serde(default)]
    pub hard_deadline: Option<DateTime<Utc>>,
    /// Earliest instant a participant may start.
    #[serde(default)]
    pub opens_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub passing: PassingThreshold,
    #[serde(default)]
    pub questions: Vec<Question>,
}

impl ExamDefinition {
    pub fn summary(&self) -> ExamSummary {
        ExamSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            passing: self.passing,
            question_count: self.questions.len(),
            allotted_duration_secs: self.allotted_duration_secs,
            hard_deadline: self.hard_deadline,
        }
    }

    /// Sum of all question marks, saturating at `u32::MAX`.
    pub fn total_marks(&self) -> u32 {
        sum_marks(self.questions.iter().map(|q| q.marks))
    }

    pub fn question(&self, id: QuestionId) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }
}

/// Exam metadata without the questions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamSummary {
    pub id: String,
    pub title: String,
    pub passing: PassingThreshold,
    pub question_count: usize,
    pub allotted_duration_secs: i64,
    #[serde(default)]
    pub hard_deadline: Option<DateTime<Utc>>,
}

/// What the exam service hands back when an execution is started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionTicket {
    pub execution_id: ExecutionId,
    pub exam_id: String,
    pub participant_id: String,
    pub started_at: DateTime<Utc>,
    pub allotted_duration_secs: i64,
    #[serde(default)]
    pub hard_deadline: Option<DateTime<Utc>>,
    pub questions: Vec<PublicQuestion>,
}

/// Per-question correctness recorded at submission time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionCorrectness {
    pub question_id: QuestionId,
    pub correct: bool,
}

/// The persisted, immutable outcome of one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub id: Uuid,
    pub execution_id: ExecutionId,
    pub exam_id: String,
    pub participant_id: String,
    pub score: u32,
    pub total_marks: u32,
    pub correctness: Vec<QuestionCorrectness>,
    /// Selections exactly as accepted.
    pub answers: Answers,
    pub submitted_at: DateTime<Utc>,
    /// Accepted after the deadline but inside the grace window.
    #[serde(default)]
    pub late: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question() -> Question {
        Question {
            id: 1,
            text: "2 + 2".into(),
            image_url: None,
            marks: 5,
            options: vec![
                AnswerOption {
                    id: 10,
                    text: "3".into(),
                    image_url: None,
                    is_correct: false,
                },
                AnswerOption {
                    id: 11,
                    text: "4".into(),
                    image_url: Some("four.png".into()),
                    is_correct: true,
                },
            ],
        }
    }

    #[test]
    fn public_question_hides_answer_key() {
        let public = question().to_public();
        let json = serde_json::to_string(&public).unwrap();
        assert!(!json.contains("isCorrect"));
        assert_eq!(public.options.len(), 2);
        assert_eq!(public.options[1].image_url.as_deref(), Some("four.png"));
    }

    #[test]
    fn correct_options_filters_flags() {
        let q = question();
        let ids: Vec<_> = q.correct_options().map(|o| o.id).collect();
        assert_eq!(ids, vec![11]);
        assert!(q.has_option(10));
        assert!(!q.has_option(12));
    }

    #[test]
    fn percent_threshold() {
        let t = PassingThreshold::Percent(50.0);
        assert!(!t.is_met(5, 20));
        assert!(t.is_met(10, 20));
        assert!(!t.is_met(0, 0));
    }

    #[test]
    fn sum_marks_saturates() {
        assert_eq!(sum_marks([5, 5, 10]), 20);
        assert_eq!(sum_marks([u32::MAX, 1, 7]), u32::MAX);
        assert_eq!(sum_marks([]), 0);
    }

    #[test]
    fn marks_threshold() {
        let t = PassingThreshold::Marks(12);
        assert!(t.is_met(12, 20));
        assert!(!t.is_met(11, 20));
        assert_eq!(t.to_string(), "12 marks");
    }

    #[test]
    fn option_accepts_snake_case_flag() {
        let opt: AnswerOption =
            serde_json::from_str(r#"{"id": 3, "text": "x", "is_correct": true}"#).unwrap();
        assert!(opt.is_correct);
    }
}
