// src/exec/command.rs

//! Subprocess execution engine.
//!
//! Runs `[executor].command` in the project root, writes the task content to
//! the child's stdin and captures stdout/stderr. The exit status decides the
//! outcome:
//!
//! - `0`: success
//! - a code listed in `transient_exit_codes`, or death by signal: transient
//! - anything else: failure reported by the engine

use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::backend::{EngineError, EngineFuture, EngineOutcome, ExecutionEngine, ExecutionRequest};

pub const ENV_TASK_ID: &str = "TASKMON_TASK_ID";
pub const ENV_PROJECT: &str = "TASKMON_PROJECT";
pub const ENV_TASK_FILE: &str = "TASKMON_TASK_FILE";

const DEFAULT_SUCCESS_SUMMARY: &str = "Task completed";
const DEFAULT_FAILURE_SUMMARY: &str = "Task failed";

#[derive(Debug, Clone)]
pub struct SubprocessEngine {
    command: Vec<String>,
    transient_exit_codes: Vec<i32>,
}

impl SubprocessEngine {
    pub fn new(command: Vec<String>, transient_exit_codes: Vec<i32>) -> Self {
        Self {
            command,
            transient_exit_codes,
        }
    }

    async fn run(&self, req: ExecutionRequest) -> Result<EngineOutcome, EngineError> {
        let Some((program, args)) = self.command.split_first() else {
            return Err(EngineError::Durable("no engine command configured".into()));
        };

        info!(
            project = %req.project,
            task = %req.task_id,
            attempt = req.attempt,
            program = %program,
            "starting engine process"
        );

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(&req.working_dir)
            .env(ENV_TASK_ID, &req.task_id)
            .env(ENV_PROJECT, &req.project)
            .env(ENV_TASK_FILE, &req.task_file)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| EngineError::Transient(format!("spawning '{program}': {e}")))?;

        // Feed stdin from a separate task so a child that writes a lot before
        // reading cannot deadlock against us.
        if let Some(mut stdin) = child.stdin.take() {
            let content = req.content.clone();
            let task_id = req.task_id.clone();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(content.as_bytes()).await {
                    debug!(task = %task_id, error = %e, "engine closed stdin early");
                }
            });
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| EngineError::Transient(format!("waiting for '{program}': {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let captured = join_output(&stdout, &stderr);

        let Some(code) = output.status.code() else {
            warn!(task = %req.task_id, "engine process terminated by signal");
            return Err(EngineError::Transient(format!(
                "'{program}' terminated by signal"
            )));
        };

        info!(
            project = %req.project,
            task = %req.task_id,
            exit_code = code,
            success = output.status.success(),
            "engine process exited"
        );

        if output.status.success() {
            let summary = last_line(&stdout).unwrap_or(DEFAULT_SUCCESS_SUMMARY);
            return Ok(EngineOutcome::success(summary, captured));
        }

        if self.transient_exit_codes.contains(&code) {
            let detail = last_line(&stderr).unwrap_or("no stderr");
            return Err(EngineError::Transient(format!(
                "exit code {code}: {detail}"
            )));
        }

        let summary = last_line(&stdout).unwrap_or(DEFAULT_FAILURE_SUMMARY);
        Ok(EngineOutcome::failure(summary, captured))
    }
}

impl ExecutionEngine for SubprocessEngine {
    fn execute(&self, request: ExecutionRequest) -> EngineFuture<'_> {
        Box::pin(self.run(request))
    }
}

fn last_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).rev().find(|l| !l.is_empty())
}

fn join_output(stdout: &str, stderr: &str) -> String {
    if stderr.trim().is_empty() {
        stdout.to_string()
    } else {
        format!("{stdout}\n--- stderr ---\n{stderr}")
    }
}
