//! TOML exam definition parser.
//!
//! Loads exams from TOML files and directories, and validates them.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::model::{AnswerOption, ExamDefinition, PassingThreshold, Question, QuestionId};

/// Intermediate TOML structure for parsing exam files.
#[derive(Debug, Deserialize)]
struct TomlExamFile {
    exam: TomlExamHeader,
    #[serde(default)]
    questions: Vec<TomlQuestion>,
}

#[derive(Debug, Deserialize)]
struct TomlExamHeader {
    id: String,
    title: String,
    #[serde(default)]
    description: String,
    duration_secs: i64,
    #[serde(default)]
    hard_deadline: Option<toml::value::Datetime>,
    #[serde(default)]
    opens_at: Option<toml::value::Datetime>,
    #[serde(default)]
    passing_percent: Option<f64>,
    #[serde(default)]
    passing_marks: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TomlQuestion {
    id: QuestionId,
    text: String,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default = "default_marks")]
    marks: u32,
    #[serde(default)]
    options: Vec<TomlOption>,
}

fn default_marks() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
struct TomlOption {
    id: u64,
    text: String,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    correct: bool,
}

fn to_utc(field: &str, value: Option<toml::value::Datetime>) -> Result<Option<DateTime<Utc>>> {
    value
        .map(|dt| {
            DateTime::parse_from_rfc3339(&dt.to_string())
                .map(|parsed| parsed.with_timezone(&Utc))
                .with_context(|| format!("{field} must be a date-time with a UTC offset, got {dt}"))
        })
        .transpose()
}

/// Parse a single TOML file into an `ExamDefinition`.
pub fn parse_exam(path: &Path) -> Result<ExamDefinition> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read exam file: {}", path.display()))?;

    parse_exam_str(&content, path)
}

/// Parse a TOML string into an `ExamDefinition` (useful for testing).
pub fn parse_exam_str(content: &str, source_path: &Path) -> Result<ExamDefinition> {
    let parsed: TomlExamFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;
    let header = parsed.exam;

    let passing = match (header.passing_marks, header.passing_percent) {
        (Some(_), Some(_)) => {
            anyhow::bail!(
                "{}: set passing_marks or passing_percent, not both",
                source_path.display()
            )
        }
        (Some(marks), None) => PassingThreshold::Marks(marks),
        (None, Some(percent)) => PassingThreshold::Percent(percent),
        (None, None) => PassingThreshold::default(),
    };

    let questions = parsed
        .questions
        .into_iter()
        .map(|q| Question {
            id: q.id,
            text: q.text,
            image_url: q.image_url,
            marks: q.marks,
            options: q
                .options
                .into_iter()
                .map(|o| AnswerOption {
                    id: o.id,
                    text: o.text,
                    image_url: o.image_url,
                    is_correct: o.correct,
                })
                .collect(),
        })
        .collect();

    Ok(ExamDefinition {
        id: header.id,
        title: header.title,
        description: header.description,
        allotted_duration_secs: header.duration_secs,
        hard_deadline: to_utc("hard_deadline", header.hard_deadline)?,
        opens_at: to_utc("opens_at", header.opens_at)?,
        passing,
        questions,
    })
}

/// Recursively load all `.toml` exam files from a directory.
pub fn load_exam_directory(dir: &Path) -> Result<Vec<ExamDefinition>> {
    let mut exams = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            exams.extend(load_exam_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_exam(&path) {
                Ok(exam) => exams.push(exam),
                Err(e) => {
                    tracing::warn!("skipping {}: {}", path.display(), e);
                }
            }
        }
    }

    Ok(exams)
}

/// A warning from exam validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationWarning {
    /// The question ID (if applicable).
    pub question_id: Option<QuestionId>,
    /// Warning message.
    pub message: String,
}

impl ValidationWarning {
    fn exam(message: impl Into<String>) -> Self {
        Self {
            question_id: None,
            message: message.into(),
        }
    }

    fn question(id: QuestionId, message: impl Into<String>) -> Self {
        Self {
            question_id: Some(id),
            message: message.into(),
        }
    }
}

/// Validate an exam for authoring mistakes that would break a session or
/// make review unreliable.
pub fn validate_exam(exam: &ExamDefinition) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    if exam.allotted_duration_secs <= 0 {
        warnings.push(ValidationWarning::exam(format!(
            "duration must be positive, got {}s",
            exam.allotted_duration_secs
        )));
    }

    if let (Some(opens), Some(hard)) = (exam.opens_at, exam.hard_deadline) {
        if hard <= opens {
            warnings.push(ValidationWarning::exam(
                "hard_deadline is not after opens_at",
            ));
        }
    }

    if exam.questions.is_empty() {
        warnings.push(ValidationWarning::exam("exam has no questions"));
    }

    let mut seen_questions = HashSet::new();
    for question in &exam.questions {
        if !seen_questions.insert(question.id) {
            warnings.push(ValidationWarning::question(
                question.id,
                format!("duplicate question ID: {}", question.id),
            ));
        }

        if question.marks == 0 {
            warnings.push(ValidationWarning::question(question.id, "marks must be positive"));
        }

        if question.options.len() < 2 {
            warnings.push(ValidationWarning::question(
                question.id,
                format!("needs at least 2 options, has {}", question.options.len()),
            ));
        }

        let mut seen_options = HashSet::new();
        for option in &question.options {
            if !seen_options.insert(option.id) {
                warnings.push(ValidationWarning::question(
                    question.id,
                    format!("duplicate option ID: {}", option.id),
                ));
            }
        }

        match question.correct_options().count() {
            1 => {}
            0 => warnings.push(ValidationWarning::question(
                question.id,
                "no option is marked correct; question will be excluded from scoring",
            )),
            n => warnings.push(ValidationWarning::question(
                question.id,
                format!("{n} options are marked correct; question will be excluded from scoring"),
            )),
        }
    }

    if exam
        .questions
        .iter()
        .try_fold(0u32, |acc, q| acc.checked_add(q.marks))
        .is_none()
    {
        warnings.push(ValidationWarning::exam(format!(
            "total marks exceed {}; scores will be capped",
            u32::MAX
        )));
    }

    let total = exam.total_marks();
    match exam.passing {
        PassingThreshold::Marks(required) if required > total => {
            warnings.push(ValidationWarning::exam(format!(
                "passing_marks {required} exceeds total marks {total}"
            )));
        }
        PassingThreshold::Percent(p) if !(0.0..=100.0).contains(&p) => {
            warnings.push(ValidationWarning::exam(format!(
                "passing_percent must be between 0 and 100, got {p}"
            )));
        }
        _ => {}
    }

    warnings
}
