pub mod init;
pub mod review;
pub mod take;
pub mod validate;

use comfy_table::{Cell, Table};

use examrun_core::presentation::Highlight;
use examrun_core::report::{badge_label, ReviewReport};

/// Print a review as a per-question table followed by the aggregate.
pub fn print_review(report: &ReviewReport) {
    let mut table = Table::new();
    table.set_header(vec!["#", "Question", "Your answer", "Correct answer", "Result", "Marks"]);

    for question in &report.questions {
        let chosen = question
            .options
            .iter()
            .find(|o| o.selected)
            .map(|o| o.text.as_str())
            .unwrap_or("-");
        let correct = question
            .options
            .iter()
            .find(|o| o.highlight == Highlight::CorrectAnswer)
            .map(|o| o.text.as_str())
            .unwrap_or("-");
        table.add_row(vec![
            Cell::new(question.question_id),
            Cell::new(&question.text),
            Cell::new(chosen),
            Cell::new(correct),
            Cell::new(badge_label(question.badge)),
            Cell::new(format!("{}/{}", question.marks_awarded, question.marks)),
        ]);
    }

    let aggregate = &report.reconciliation.aggregate;
    println!("{}\n", report.exam.title);
    println!("{table}");
    println!(
        "\nScore: {}/{} ({:.1}%), {}, {}",
        aggregate.score,
        aggregate.total_marks,
        aggregate.percentage,
        if aggregate.passed { "PASSED" } else { "NOT PASSED" },
        aggregate.feedback
    );
    if report.result.late {
        println!("Submitted during the grace period.");
    }
    for issue in &aggregate.integrity_issues {
        println!("Excluded from scoring: {issue}");
    }
}
