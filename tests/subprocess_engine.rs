// tests/subprocess_engine.rs
#![cfg(unix)]

use std::path::Path;

use taskmon::exec::{EngineError, ExecutionEngine, ExecutionRequest, SubprocessEngine};

fn request(dir: &Path, content: &str) -> ExecutionRequest {
    ExecutionRequest {
        task_id: "task-20260101-100000-shell".into(),
        project: "alpha".into(),
        content: content.into(),
        working_dir: dir.to_path_buf(),
        task_file: dir.join("tasks/task-20260101-100000-shell.md"),
        attempt: 1,
    }
}

fn shell(script: &str) -> SubprocessEngine {
    SubprocessEngine::new(
        vec!["sh".into(), "-c".into(), script.into()],
        vec![75],
    )
}

#[tokio::test]
async fn task_content_is_fed_on_stdin_and_last_line_is_the_summary() {
    let dir = tempfile::tempdir().unwrap();
    let engine = shell(r#"read line; echo "working on $TASKMON_TASK_ID"; echo "did: $line""#);

    let outcome = engine
        .execute(request(dir.path(), "fix the login page\n"))
        .await
        .unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.summary, "did: fix the login page");
    assert!(outcome.output.contains("working on task-20260101-100000-shell"));
}

#[tokio::test]
async fn engine_runs_in_the_project_root() {
    let dir = tempfile::tempdir().unwrap();
    let engine = shell("pwd");

    let outcome = engine.execute(request(dir.path(), "")).await.unwrap();
    let reported = std::fs::canonicalize(outcome.summary.trim()).unwrap();
    assert_eq!(reported, std::fs::canonicalize(dir.path()).unwrap());
}

#[tokio::test]
async fn nonzero_exit_is_a_reported_failure() {
    let dir = tempfile::tempdir().unwrap();
    let engine = shell("echo 'tests failed: 3'; echo oops >&2; exit 1");

    let outcome = engine.execute(request(dir.path(), "")).await.unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.summary, "tests failed: 3");
    assert!(outcome.output.contains("--- stderr ---\noops"));
}

#[tokio::test]
async fn configured_exit_code_is_transient() {
    let dir = tempfile::tempdir().unwrap();
    let engine = shell("echo 'rate limited' >&2; exit 75");

    match engine.execute(request(dir.path(), "")).await {
        Err(EngineError::Transient(msg)) => assert!(msg.contains("rate limited")),
        other => panic!("Expected transient error, got: {other:?}"),
    }
}

#[tokio::test]
async fn missing_program_is_transient() {
    let dir = tempfile::tempdir().unwrap();
    let engine = SubprocessEngine::new(vec!["/nonexistent/taskmon-engine".into()], vec![]);

    assert!(matches!(
        engine.execute(request(dir.path(), "")).await,
        Err(EngineError::Transient(_))
    ));
}
