//! Review reconciliation.
//!
//! Compares recorded selections against the answer key. This is the only
//! place the scoring rule lives; the exam service grades submissions with it
//! and the presentation layer reads its output without re-deriving anything.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{
    sum_marks, Answers, OptionId, PassingThreshold, Question, QuestionCorrectness, QuestionId,
    SubmissionResult,
};

/// How a single question turned out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Correct,
    Incorrect,
    Unanswered,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Correct => write!(f, "correct"),
            Outcome::Incorrect => write!(f, "incorrect"),
            Outcome::Unanswered => write!(f, "unanswered"),
        }
    }
}

/// One scored question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciledAnswer {
    pub question_id: QuestionId,
    pub selected: Option<OptionId>,
    pub correct_option: OptionId,
    pub outcome: Outcome,
    pub marks: u32,
    pub marks_awarded: u32,
}

/// A question left out of scoring because its answer key is unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityIssue {
    pub question_id: QuestionId,
    /// How many options were flagged correct (zero or more than one).
    pub correct_options: usize,
}

impl fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.correct_options {
            0 => write!(f, "question {} has no correct option", self.question_id),
            n => write!(
                f,
                "question {} has {n} options flagged correct",
                self.question_id
            ),
        }
    }
}

/// Feedback band derived from the percentage score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feedback {
    Excellent,
    VeryGood,
    Good,
    KeepPracticing,
}

impl Feedback {
    pub fn from_percentage(percentage: f64) -> Self {
        if percentage >= 90.0 {
            Feedback::Excellent
        } else if percentage >= 75.0 {
            Feedback::VeryGood
        } else if percentage >= 50.0 {
            Feedback::Good
        } else {
            Feedback::KeepPracticing
        }
    }
}

impl fmt::Display for Feedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feedback::Excellent => write!(f, "Excellent!"),
            Feedback::VeryGood => write!(f, "Very Good!"),
            Feedback::Good => write!(f, "Good"),
            Feedback::KeepPracticing => write!(f, "Keep Practicing"),
        }
    }
}

/// Totals across all scored questions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub score: u32,
    /// Sum of marks over scored questions; excluded questions do not count.
    pub total_marks: u32,
    pub percentage: f64,
    pub passed: bool,
    pub feedback: Feedback,
    /// Questions excluded from scoring.
    #[serde(default)]
    pub integrity_issues: Vec<IntegrityIssue>,
}

impl Aggregate {
    pub fn has_integrity_issues(&self) -> bool {
        !self.integrity_issues.is_empty()
    }
}

/// Output of [`reconcile`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reconciliation {
    /// Scored questions, in exam order.
    pub answers: Vec<ReconciledAnswer>,
    pub aggregate: Aggregate,
}

impl Reconciliation {
    /// Per-question correctness as recorded on a submission result.
    pub fn correctness(&self) -> Vec<QuestionCorrectness> {
        self.answers
            .iter()
            .map(|a| QuestionCorrectness {
                question_id: a.question_id,
                correct: a.outcome == Outcome::Correct,
            })
            .collect()
    }

    pub fn answer_for(&self, question_id: QuestionId) -> Option<&ReconciledAnswer> {
        self.answers.iter().find(|a| a.question_id == question_id)
    }
}

/// Score `answers` against the answer key in `questions`.
///
/// A question whose options carry zero or several correctness flags is not
/// guessed at: it is excluded from scoring and reported in
/// [`Aggregate::integrity_issues`].
pub fn reconcile(
    questions: &[Question],
    answers: &Answers,
    passing: PassingThreshold,
) -> Reconciliation {
    let mut reconciled = Vec::with_capacity(questions.len());
    let mut integrity_issues = Vec::new();

    for question in questions {
        let mut correct = question.correct_options();
        let correct_option = match (correct.next(), correct.next()) {
            (Some(only), None) => only.id,
            _ => {
                let issue = IntegrityIssue {
                    question_id: question.id,
                    correct_options: question.correct_options().count(),
                };
                tracing::warn!(question_id = question.id, "{issue}, excluding from scoring");
                integrity_issues.push(issue);
                continue;
            }
        };

        let selected = answers.get(&question.id).copied();
        let outcome = match selected {
            None => Outcome::Unanswered,
            Some(id) if id == correct_option => Outcome::Correct,
            Some(_) => Outcome::Incorrect,
        };
        let marks_awarded = if outcome == Outcome::Correct {
            question.marks
        } else {
            0
        };

        reconciled.push(ReconciledAnswer {
            question_id: question.id,
            selected,
            correct_option,
            outcome,
            marks: question.marks,
            marks_awarded,
        });
    }

    let score = sum_marks(reconciled.iter().map(|a| a.marks_awarded));
    let total_marks = sum_marks(reconciled.iter().map(|a| a.marks));
    let percentage = if total_marks == 0 {
        0.0
    } else {
        score as f64 / total_marks as f64 * 100.0
    };

    Reconciliation {
        answers: reconciled,
        aggregate: Aggregate {
            score,
            total_marks,
            percentage,
            passed: passing.is_met(score, total_marks),
            feedback: Feedback::from_percentage(percentage),
            integrity_issues,
        },
    }
}

/// Reconcile the selections stored on a submission result.
pub fn reconcile_result(
    questions: &[Question],
    result: &SubmissionResult,
    passing: PassingThreshold,
) -> Reconciliation {
    reconcile(questions, &result.answers, passing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AnswerOption;

    fn q(id: QuestionId, marks: u32, correct: &[bool]) -> Question {
        Question {
            id,
            text: format!("Q{id}"),
            image_url: None,
            marks,
            options: correct
                .iter()
                .enumerate()
                .map(|(i, &is_correct)| AnswerOption {
                    id: id * 10 + i as u64,
                    text: format!("option {i}"),
                    image_url: None,
                    is_correct,
                })
                .collect(),
        }
    }

    fn scenario_a() -> Vec<Question> {
        vec![
            q(1, 5, &[true, false, false]),
            q(2, 5, &[false, true, false]),
            q(3, 10, &[false, false, true]),
        ]
    }

    #[test]
    fn correct_incorrect_unanswered() {
        let answers = Answers::from([(1, 10), (2, 20)]);
        let r = reconcile(&scenario_a(), &answers, PassingThreshold::Percent(50.0));

        let outcomes: Vec<_> = r.answers.iter().map(|a| a.outcome).collect();
        assert_eq!(
            outcomes,
            vec![Outcome::Correct, Outcome::Incorrect, Outcome::Unanswered]
        );
        assert_eq!(r.aggregate.score, 5);
        assert_eq!(r.aggregate.total_marks, 20);
        assert!(!r.aggregate.passed);
        assert_eq!(r.aggregate.feedback, Feedback::KeepPracticing);
        assert!(!r.aggregate.has_integrity_issues());
    }

    #[test]
    fn marks_awarded_sum_to_score() {
        let answers = Answers::from([(1, 10), (2, 21), (3, 32)]);
        let r = reconcile(&scenario_a(), &answers, PassingThreshold::default());
        let summed: u32 = r.answers.iter().map(|a| a.marks_awarded).sum();
        assert_eq!(summed, r.aggregate.score);
        assert_eq!(r.aggregate.score, 20);
        assert!(r.aggregate.passed);
        assert_eq!(r.aggregate.feedback, Feedback::Excellent);
    }

    #[test]
    fn huge_marks_saturate_instead_of_overflowing() {
        let questions = vec![
            q(1, u32::MAX, &[true, false]),
            q(2, u32::MAX, &[true, false]),
        ];
        let answers = Answers::from([(1, 10), (2, 20)]);
        let r = reconcile(&questions, &answers, PassingThreshold::default());
        assert_eq!(r.aggregate.score, u32::MAX);
        assert_eq!(r.aggregate.total_marks, u32::MAX);
        assert!(r.aggregate.passed);
    }

    #[test]
    fn reconcile_is_pure() {
        let answers = Answers::from([(1, 11), (3, 32)]);
        let first = reconcile(&scenario_a(), &answers, PassingThreshold::Marks(10));
        let second = reconcile(&scenario_a(), &answers, PassingThreshold::Marks(10));
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn multiple_correct_options_excluded() {
        let questions = vec![
            q(1, 5, &[true, false]),
            q(2, 7, &[true, true]),
            q(3, 3, &[false, false]),
        ];
        let answers = Answers::from([(1, 10), (2, 20), (3, 30)]);
        let r = reconcile(&questions, &answers, PassingThreshold::Percent(50.0));

        assert_eq!(r.answers.len(), 1);
        assert_eq!(r.aggregate.total_marks, 5);
        assert_eq!(r.aggregate.score, 5);
        assert!(r.aggregate.has_integrity_issues());
        assert_eq!(
            r.aggregate.integrity_issues,
            vec![
                IntegrityIssue {
                    question_id: 2,
                    correct_options: 2
                },
                IntegrityIssue {
                    question_id: 3,
                    correct_options: 0
                },
            ]
        );
        assert!(r.answer_for(2).is_none());
    }

    #[test]
    fn unknown_selection_is_incorrect() {
        let answers = Answers::from([(1, 999)]);
        let r = reconcile(&scenario_a(), &answers, PassingThreshold::default());
        assert_eq!(r.answers[0].outcome, Outcome::Incorrect);
        assert_eq!(r.answers[0].selected, Some(999));
    }

    #[test]
    fn empty_exam_scores_zero() {
        let r = reconcile(&[], &Answers::new(), PassingThreshold::Percent(0.0));
        assert_eq!(r.aggregate.score, 0);
        assert_eq!(r.aggregate.total_marks, 0);
        assert_eq!(r.aggregate.percentage, 0.0);
        assert!(!r.aggregate.passed);
    }

    #[test]
    fn feedback_bands() {
        assert_eq!(Feedback::from_percentage(90.0), Feedback::Excellent);
        assert_eq!(Feedback::from_percentage(89.9), Feedback::VeryGood);
        assert_eq!(Feedback::from_percentage(75.0), Feedback::VeryGood);
        assert_eq!(Feedback::from_percentage(50.0), Feedback::Good);
        assert_eq!(Feedback::from_percentage(49.0), Feedback::KeepPracticing);
    }

    #[test]
    fn correctness_list_follows_outcomes() {
        let answers = Answers::from([(1, 10), (2, 20)]);
        let r = reconcile(&scenario_a(), &answers, PassingThreshold::default());
        let correctness = r.correctness();
        assert_eq!(correctness.len(), 3);
        assert!(correctness[0].correct);
        assert!(!correctness[1].correct);
        assert!(!correctness[2].correct);
    }
}
