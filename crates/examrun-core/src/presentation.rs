//! Highlight and badge states for displaying a reviewed execution.
//!
//! Everything here is derived from a [`Reconciliation`]; option correctness
//! flags on the questions are never consulted.

use serde::{Deserialize, Serialize};

use crate::model::{OptionId, Question, QuestionId};
use crate::reconcile::{Outcome, ReconciledAnswer, Reconciliation};

/// How a single option should be highlighted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Highlight {
    /// The option is the answer key's correct option.
    CorrectAnswer,
    /// The participant picked this option and it is wrong.
    ParticipantChoiceWrong,
    Neutral,
}

/// Badge shown next to a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Badge {
    Correct,
    Incorrect,
    Unanswered,
    /// Left out of scoring because of an answer-key problem.
    Excluded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionView {
    pub option_id: OptionId,
    pub text: String,
    pub selected: bool,
    pub highlight: Highlight,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionView {
    pub question_id: QuestionId,
    pub text: String,
    pub badge: Badge,
    pub marks: u32,
    pub marks_awarded: u32,
    pub options: Vec<OptionView>,
}

/// Highlight for one option given the reconciled answer of its question.
pub fn highlight(answer: &ReconciledAnswer, option_id: OptionId) -> Highlight {
    if option_id == answer.correct_option {
        Highlight::CorrectAnswer
    } else if answer.outcome == Outcome::Incorrect && answer.selected == Some(option_id) {
        Highlight::ParticipantChoiceWrong
    } else {
        Highlight::Neutral
    }
}

pub fn badge(outcome: Outcome) -> Badge {
    match outcome {
        Outcome::Correct => Badge::Correct,
        Outcome::Incorrect => Badge::Incorrect,
        Outcome::Unanswered => Badge::Unanswered,
    }
}

/// Build display views for every question, in exam order.
///
/// `questions` supplies text and option order only. Questions absent from
/// the reconciliation are shown as [`Badge::Excluded`] with neutral options.
pub fn present(questions: &[Question], reconciliation: &Reconciliation) -> Vec<QuestionView> {
    questions
        .iter()
        .map(|question| match reconciliation.answer_for(question.id) {
            Some(answer) => QuestionView {
                question_id: question.id,
                text: question.text.clone(),
                badge: badge(answer.outcome),
                marks: answer.marks,
                marks_awarded: answer.marks_awarded,
                options: question
                    .options
                    .iter()
                    .map(|o| OptionView {
                        option_id: o.id,
                        text: o.text.clone(),
                        selected: answer.selected == Some(o.id),
                        highlight: highlight(answer, o.id),
                    })
                    .collect(),
            },
            None => QuestionView {
                question_id: question.id,
                text: question.text.clone(),
                badge: Badge::Excluded,
                marks: question.marks,
                marks_awarded: 0,
                options: question
                    .options
                    .iter()
                    .map(|o| OptionView {
                        option_id: o.id,
                        text: o.text.clone(),
                        selected: false,
                        highlight: Highlight::Neutral,
                    })
                    .collect(),
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnswerOption, Answers, PassingThreshold};
    use crate::reconcile::reconcile;

    fn question(id: QuestionId, correct: &[bool]) -> Question {
        Question {
            id,
            text: format!("Q{id}"),
            image_url: None,
            marks: 2,
            options: correct
                .iter()
                .enumerate()
                .map(|(i, &is_correct)| AnswerOption {
                    id: id * 10 + i as u64,
                    text: format!("o{i}"),
                    image_url: None,
                    is_correct,
                })
                .collect(),
        }
    }

    fn highlights(view: &QuestionView) -> Vec<Highlight> {
        view.options.iter().map(|o| o.highlight).collect()
    }

    #[test]
    fn wrong_choice_and_correct_answer_highlighted() {
        let questions = vec![question(1, &[false, true, false])];
        let r = reconcile(&questions, &Answers::from([(1, 12)]), PassingThreshold::default());
        let views = present(&questions, &r);

        assert_eq!(views[0].badge, Badge::Incorrect);
        assert_eq!(
            highlights(&views[0]),
            vec![
                Highlight::Neutral,
                Highlight::CorrectAnswer,
                Highlight::ParticipantChoiceWrong
            ]
        );
        assert!(views[0].options[2].selected);
    }

    #[test]
    fn correct_choice_only_marks_correct_answer() {
        let questions = vec![question(1, &[true, false])];
        let r = reconcile(&questions, &Answers::from([(1, 10)]), PassingThreshold::default());
        let views = present(&questions, &r);
        assert_eq!(views[0].badge, Badge::Correct);
        assert_eq!(
            highlights(&views[0]),
            vec![Highlight::CorrectAnswer, Highlight::Neutral]
        );
        assert_eq!(views[0].marks_awarded, 2);
    }

    #[test]
    fn unanswered_shows_key_without_wrong_choice() {
        let questions = vec![question(1, &[false, true])];
        let r = reconcile(&questions, &Answers::new(), PassingThreshold::default());
        let views = present(&questions, &r);
        assert_eq!(views[0].badge, Badge::Unanswered);
        assert_eq!(
            highlights(&views[0]),
            vec![Highlight::Neutral, Highlight::CorrectAnswer]
        );
    }

    #[test]
    fn excluded_question_is_neutral() {
        let questions = vec![question(1, &[true, true]), question(2, &[true, false])];
        let r = reconcile(
            &questions,
            &Answers::from([(1, 10), (2, 20)]),
            PassingThreshold::default(),
        );
        let views = present(&questions, &r);
        assert_eq!(views[0].badge, Badge::Excluded);
        assert!(views[0]
            .options
            .iter()
            .all(|o| o.highlight == Highlight::Neutral && !o.selected));
        assert_eq!(views[1].badge, Badge::Correct);
    }

    #[test]
    fn views_ignore_answer_key_flags() {
        // Flip the flags after reconciling; the views must not change.
        let questions = vec![question(1, &[false, true])];
        let r = reconcile(&questions, &Answers::from([(1, 10)]), PassingThreshold::default());
        let mut tampered = questions.clone();
        for o in &mut tampered[0].options {
            o.is_correct = !o.is_correct;
        }
        assert_eq!(present(&questions, &r), present(&tampered, &r));
    }
}
