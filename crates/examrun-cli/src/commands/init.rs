//! The `examrun init` command.

use anyhow::Result;

pub fn execute() -> Result<()> {
    if std::path::Path::new("examrun.toml").exists() {
        println!("examrun.toml already exists, skipping.");
    } else {
        std::fs::write("examrun.toml", SAMPLE_CONFIG)?;
        println!("Created examrun.toml");
    }

    std::fs::create_dir_all("exams")?;
    let example_path = std::path::Path::new("exams/example.toml");
    if example_path.exists() {
        println!("exams/example.toml already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_EXAM)?;
        println!("Created exams/example.toml");
    }

    println!("\nNext steps:");
    println!("  1. Edit examrun.toml (memory backend works out of the box)");
    println!("  2. Run: examrun validate --exam exams/example.toml");
    println!("  3. Run: examrun take --exam exams/example.toml --answers \"1=11,2=22\"");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# examrun configuration

participant_id = "student-1"
tick_interval_ms = 1000
submit_timeout_ms = 10000
grace_period_secs = 60
max_manual_retries = 1
output_dir = "./examrun-results"

[backend]
type = "memory"

# To use a remote exam service instead:
# [backend]
# type = "http"
# base_url = "https://exams.example.com"
# api_token = "${EXAMRUN_API_TOKEN}"
"#;

const EXAMPLE_EXAM: &str = r#"[exam]
id = "example"
title = "Example Exam"
description = "A short exam to get started"
duration_secs = 300
passing_percent = 50

[[questions]]
id = 1
text = "Which planet is closest to the sun?"
marks = 5

[[questions.options]]
id = 10
text = "Venus"

[[questions.options]]
id = 11
text = "Mercury"
correct = true

[[questions.options]]
id = 12
text = "Mars"

[[questions]]
id = 2
text = "What is 7 x 8?"
marks = 5

[[questions.options]]
id = 20
text = "54"

[[questions.options]]
id = 21
text = "58"

[[questions.options]]
id = 22
text = "56"
correct = true
"#;
