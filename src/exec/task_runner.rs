// src/exec/task_runner.rs

//! Runs one task record to a terminal state.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::config::{ExecutorSettings, ProjectPaths};
use crate::exec::backend::{EngineError, ExecutionEngine, ExecutionRequest};
use crate::fs::FileSystem;
use crate::store::{ResultRecord, ResultStore, TaskFailure};
use crate::task::{ResultSummary, TaskRecord};
use crate::types::{FailureKind, TaskStatus};

/// Result of a single engine invocation, before it becomes a record.
#[derive(Debug)]
struct AttemptOutcome {
    summary: String,
    output: String,
    failure: Option<TaskFailure>,
}

impl AttemptOutcome {
    fn failed(kind: FailureKind, message: impl Into<String>, summary: &str, output: String) -> Self {
        Self {
            summary: summary.to_string(),
            output,
            failure: Some(TaskFailure {
                kind,
                message: message.into(),
            }),
        }
    }
}

/// Per-project task executor.
///
/// Every attempt is bounded by the configured timeout and writes exactly one
/// result record (replacing the previous attempt's). Timeouts and transient
/// engine errors are retried up to `max_attempts`; everything else is final.
#[derive(Clone)]
pub struct TaskExecutor {
    engine: Arc<dyn ExecutionEngine>,
    settings: ExecutorSettings,
    paths: ProjectPaths,
    results: ResultStore,
    fs: Arc<dyn FileSystem>,
}

impl TaskExecutor {
    pub fn new(
        engine: Arc<dyn ExecutionEngine>,
        settings: ExecutorSettings,
        paths: ProjectPaths,
        results: ResultStore,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        Self {
            engine,
            settings,
            paths,
            results,
            fs,
        }
    }

    /// Execute a `Running` record. On return the record is `Completed` or
    /// `Failed` and the returned result record has been persisted.
    pub async fn execute(&self, record: &mut TaskRecord) -> ResultRecord {
        let content = match self.fs.read_to_string(&record.source_path) {
            Ok(content) => content,
            Err(err) => {
                error!(
                    project = %record.project,
                    task = %record.id,
                    path = %record.source_path.display(),
                    error = %format!("{err:#}"),
                    "task file unreadable"
                );
                record.attempt += 1;
                let started = record.started_at().unwrap_or_else(Utc::now);
                let outcome = AttemptOutcome::failed(
                    FailureKind::TaskFileUnreadable,
                    format!("{err:#}"),
                    "Task file unreadable",
                    String::new(),
                );
                let result = self.finish_attempt(record, started, outcome).await;
                self.settle_record(record, &result);
                return result;
            }
        };

        loop {
            record.attempt += 1;
            let started = Utc::now();
            let outcome = self.run_attempt(record, &content).await;
            let result = self.finish_attempt(record, started, outcome).await;

            let retryable = result.error.as_ref().is_some_and(|f| f.kind.is_retryable());
            if retryable && record.attempt < self.settings.max_attempts {
                let delay = self.settings.retry.next_delay(record.attempt);
                warn!(
                    project = %record.project,
                    task = %record.id,
                    attempt = record.attempt,
                    max_attempts = self.settings.max_attempts,
                    ?delay,
                    "attempt failed; retrying"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            self.settle_record(record, &result);
            return result;
        }
    }

    async fn run_attempt(&self, record: &TaskRecord, content: &str) -> AttemptOutcome {
        let request = ExecutionRequest {
            task_id: record.id.clone(),
            project: record.project.clone(),
            content: content.to_string(),
            working_dir: self.paths.root.clone(),
            task_file: record.source_path.clone(),
            attempt: record.attempt,
        };

        match tokio::time::timeout(self.settings.timeout, self.engine.execute(request)).await {
            Err(_) => AttemptOutcome::failed(
                FailureKind::Timeout,
                format!("execution exceeded timeout of {:?}", self.settings.timeout),
                "Task timed out",
                String::new(),
            ),
            Ok(Err(EngineError::Transient(msg))) => {
                AttemptOutcome::failed(FailureKind::Transient, msg, "Task failed", String::new())
            }
            Ok(Err(EngineError::Durable(msg))) => {
                AttemptOutcome::failed(FailureKind::Engine, msg, "Task failed", String::new())
            }
            Ok(Ok(outcome)) if outcome.success => AttemptOutcome {
                summary: outcome.summary,
                output: outcome.output,
                failure: None,
            },
            Ok(Ok(outcome)) => {
                let message = outcome.summary.clone();
                AttemptOutcome::failed(FailureKind::Engine, message, &outcome.summary, outcome.output)
            }
        }
    }

    /// Persist the result of one attempt and append it to the task's log.
    async fn finish_attempt(
        &self,
        record: &TaskRecord,
        started: DateTime<Utc>,
        outcome: AttemptOutcome,
    ) -> ResultRecord {
        let completed = Utc::now();
        let duration = (completed - started)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        let result = ResultRecord {
            task_id: record.id.clone(),
            project: record.project.clone(),
            status: if outcome.failure.is_none() {
                TaskStatus::Completed
            } else {
                TaskStatus::Failed
            },
            attempt: record.attempt,
            started_at: started,
            completed_at: completed,
            duration_seconds: duration,
            summary: outcome.summary,
            output: outcome.output,
            error: outcome.failure,
        };

        self.results.record(&result).await;
        self.append_transcript(&result);

        match &result.error {
            None => info!(
                project = %result.project,
                task = %result.task_id,
                attempt = result.attempt,
                duration_seconds = result.duration_seconds,
                "task completed"
            ),
            Some(failure) => warn!(
                project = %result.project,
                task = %result.task_id,
                attempt = result.attempt,
                kind = %failure.kind,
                error = %failure.message,
                "task attempt failed"
            ),
        }
        result
    }

    fn settle_record(&self, record: &mut TaskRecord, result: &ResultRecord) {
        let summary = ResultSummary {
            summary: result.summary.clone(),
            output: result.output.clone(),
        };
        let transition = if result.is_success() {
            record.complete(result.completed_at, summary)
        } else {
            record.fail(result.completed_at, summary)
        };
        if let Err(err) = transition {
            warn!(project = %record.project, task = %record.id, error = %err, "could not settle task record");
        }
    }

    fn append_transcript(&self, result: &ResultRecord) {
        let path = self.paths.logs.join(format!("{}.log", result.task_id));
        let mut text = format!(
            "=== {} attempt {} started {} ===\n",
            result.task_id,
            result.attempt,
            result.started_at.to_rfc3339()
        );
        if !result.output.is_empty() {
            text.push_str(&result.output);
            if !result.output.ends_with('\n') {
                text.push('\n');
            }
        }
        match &result.error {
            None => text.push_str(&format!("--- {}: {}\n", result.status, result.summary)),
            Some(f) => text.push_str(&format!("--- {} ({}): {}\n", result.status, f.kind, f.message)),
        }

        if let Err(err) = self.fs.append(&path, text.as_bytes()) {
            warn!(path = %path.display(), error = %format!("{err:#}"), "could not write task transcript");
        }
    }
}
