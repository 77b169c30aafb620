//! CLI integration tests using assert_cmd.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn examrun() -> Command {
    #[allow(deprecated)]
    Command::cargo_bin("examrun").unwrap()
}

/// Write a memory-backend config into `dir` and return its path.
fn memory_config(dir: &Path, extra: &str) -> PathBuf {
    let path = dir.join("examrun.toml");
    std::fs::write(
        &path,
        format!("tick_interval_ms = 100\n{extra}\n[backend]\ntype = \"memory\"\n"),
    )
    .unwrap();
    path
}

fn files_with_prefix(dir: &Path, prefix: &str) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(prefix))
        })
        .collect()
}

#[test]
fn validate_valid_exam() {
    examrun()
        .arg("validate")
        .arg("--exam")
        .arg("../../exams/astronomy.toml")
        .assert()
        .success()
        .stdout(predicate::str::contains("4 questions"))
        .stdout(predicate::str::contains("All exams valid"));
}

#[test]
fn validate_directory() {
    examrun()
        .arg("validate")
        .arg("--exam")
        .arg("../../exams")
        .assert()
        .success()
        .stdout(predicate::str::contains("Astronomy Basics"))
        .stdout(predicate::str::contains("Arithmetic Quiz"));
}

#[test]
fn validate_reports_warnings() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(
        &path,
        r#"
[exam]
id = "broken"
title = "Broken"
duration_secs = 60

[[questions]]
id = 1
text = "Which?"

[[questions.options]]
id = 1
text = "a"
correct = true

[[questions.options]]
id = 2
text = "b"
correct = true
"#,
    )
    .unwrap();

    examrun()
        .arg("validate")
        .arg("--exam")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("[Q1] WARNING"))
        .stdout(predicate::str::contains("1 warning(s) found"));
}

#[test]
fn validate_nonexistent_file() {
    examrun()
        .arg("validate")
        .arg("--exam")
        .arg("nonexistent.toml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn init_creates_files() {
    let dir = TempDir::new().unwrap();

    examrun()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created examrun.toml"))
        .stdout(predicate::str::contains("Created exams/example.toml"));

    assert!(dir.path().join("examrun.toml").exists());
    assert!(dir.path().join("exams/example.toml").exists());

    examrun()
        .current_dir(dir.path())
        .arg("validate")
        .arg("--exam")
        .arg("exams/example.toml")
        .assert()
        .success()
        .stdout(predicate::str::contains("All exams valid"));
}

#[test]
fn init_skips_existing() {
    let dir = TempDir::new().unwrap();

    examrun().current_dir(dir.path()).arg("init").assert().success();

    examrun()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn take_submits_and_reviews() {
    let dir = TempDir::new().unwrap();
    let config = memory_config(dir.path(), "");
    let output = dir.path().join("out");

    examrun()
        .arg("take")
        .arg("--exam")
        .arg("../../exams/astronomy.toml")
        .arg("--participant")
        .arg("alice")
        .arg("--answers")
        .arg("1=11,2=20,3=31")
        .arg("--output")
        .arg(&output)
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Score: 15/30"))
        .stdout(predicate::str::contains("incorrect"))
        .stdout(predicate::str::contains("unanswered"));

    let results = files_with_prefix(&output, "result-");
    assert_eq!(results.len(), 1);
    let result: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&results[0]).unwrap()).unwrap();
    assert_eq!(result["score"], 15);
    assert_eq!(result["late"], false);
    assert_eq!(files_with_prefix(&output, "review-").len(), 1);
}

#[test]
fn take_skips_invalid_selection() {
    let dir = TempDir::new().unwrap();
    let config = memory_config(dir.path(), "participant_id = \"bob\"");

    examrun()
        .arg("take")
        .arg("--exam")
        .arg("../../exams/arithmetic.toml")
        .arg("--answers")
        .arg("1=1,2=99")
        .arg("--output")
        .arg(dir.path().join("out"))
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stderr(predicate::str::contains("Skipped 2=99"))
        .stdout(predicate::str::contains("Score: 2/6"));
}

#[test]
fn take_waits_for_expiry() {
    let dir = TempDir::new().unwrap();
    let config = memory_config(dir.path(), "");
    let exam = dir.path().join("quick.toml");
    std::fs::write(
        &exam,
        r#"
[exam]
id = "quick"
title = "Quick"
duration_secs = 1

[[questions]]
id = 1
text = "Ready?"

[[questions.options]]
id = 1
text = "yes"
correct = true

[[questions.options]]
id = 2
text = "no"
"#,
    )
    .unwrap();

    examrun()
        .arg("take")
        .arg("--exam")
        .arg(&exam)
        .arg("--participant")
        .arg("carol")
        .arg("--answers")
        .arg("1=1")
        .arg("--wait-for-expiry")
        .arg("--output")
        .arg(dir.path().join("out"))
        .arg("--config")
        .arg(&config)
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .success()
        .stderr(predicate::str::contains("Waiting for time to run out"))
        .stdout(predicate::str::contains("Score: 1/1"));
}

#[test]
fn take_requires_participant() {
    let dir = TempDir::new().unwrap();
    let config = memory_config(dir.path(), "");

    examrun()
        .arg("take")
        .arg("--exam")
        .arg("../../exams/arithmetic.toml")
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("no participant given"));
}

fn write_result(dir: &Path, exam_id: &str, score: u32) -> PathBuf {
    let path = dir.join("result.json");
    let result = serde_json::json!({
        "id": "00000000-0000-0000-0000-000000000000",
        "execution_id": "6a1f7f5e-0d57-4a8e-9d6b-1f0f7f7a2b10",
        "exam_id": exam_id,
        "participant_id": "alice",
        "score": score,
        "total_marks": 6,
        "correctness": [],
        "answers": {"1": 1, "2": 3},
        "submitted_at": "2026-01-15T10:02:00Z",
        "late": false
    });
    std::fs::write(&path, serde_json::to_string_pretty(&result).unwrap()).unwrap();
    path
}

#[test]
fn review_text_output() {
    let dir = TempDir::new().unwrap();
    let result = write_result(dir.path(), "arithmetic-quiz", 2);

    examrun()
        .arg("review")
        .arg("--exam")
        .arg("../../exams/arithmetic.toml")
        .arg("--result")
        .arg(&result)
        .assert()
        .success()
        .stdout(predicate::str::contains("Arithmetic Quiz"))
        .stdout(predicate::str::contains("Score: 2/6"))
        .stdout(predicate::str::contains("NOT PASSED"));
}

#[test]
fn review_json_output() {
    let dir = TempDir::new().unwrap();
    let result = write_result(dir.path(), "arithmetic-quiz", 2);

    let output = examrun()
        .arg("review")
        .arg("--exam")
        .arg("../../exams/arithmetic.toml")
        .arg("--result")
        .arg(&result)
        .arg("--format")
        .arg("json")
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["reconciliation"]["aggregate"]["score"], 2);
    assert_eq!(report["questions"][1]["badge"], "incorrect");
    assert_eq!(report["questions"][2]["badge"], "unanswered");
}

#[test]
fn review_warns_on_score_drift() {
    let dir = TempDir::new().unwrap();
    let result = write_result(dir.path(), "arithmetic-quiz", 6);

    examrun()
        .arg("review")
        .arg("--exam")
        .arg("../../exams/arithmetic.toml")
        .arg("--result")
        .arg(&result)
        .arg("--format")
        .arg("markdown")
        .assert()
        .success()
        .stderr(predicate::str::contains("differs from reconciled score"))
        .stdout(predicate::str::contains("## Arithmetic Quiz"));
}

#[test]
fn review_rejects_mismatched_exam() {
    let dir = TempDir::new().unwrap();
    let result = write_result(dir.path(), "astronomy-101", 0);

    examrun()
        .arg("review")
        .arg("--exam")
        .arg("../../exams/arithmetic.toml")
        .arg("--result")
        .arg(&result)
        .assert()
        .failure()
        .stderr(predicate::str::contains("result belongs to exam"));
}

#[test]
fn help_output() {
    examrun()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Timed multiple-choice exam runner"));
}

#[test]
fn version_output() {
    examrun()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("examrun"));
}
