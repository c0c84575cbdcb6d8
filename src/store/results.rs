// src/store/results.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::Result;
use crate::fs::FileSystem;
use crate::retry::{RetryPolicy, retry_until_ok};
use crate::types::{FailureKind, TaskStatus};

/// Why a task attempt failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub kind: FailureKind,
    pub message: String,
}

/// Outcome of one task attempt, stored as `<results-dir>/<task_id>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub task_id: String,
    pub project: String,
    pub status: TaskStatus,
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub output: String,
    /// `None` on success.
    #[serde(default)]
    pub error: Option<TaskFailure>,
}

impl ResultRecord {
    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Completed && self.error.is_none()
    }
}

/// One JSON file per task id; each write atomically replaces the previous
/// attempt's record.
#[derive(Debug, Clone)]
pub struct ResultStore {
    dir: PathBuf,
    fs: Arc<dyn FileSystem>,
    persist_retry: RetryPolicy,
}

impl ResultStore {
    pub fn new(dir: &Path, fs: Arc<dyn FileSystem>, persist_retry: RetryPolicy) -> Self {
        Self {
            dir: dir.to_path_buf(),
            fs,
            persist_retry,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, task_id: &str) -> PathBuf {
        self.dir.join(format!("{task_id}.json"))
    }

    /// Persist `record`, backing off and retrying until the write succeeds.
    pub async fn record(&self, record: &ResultRecord) {
        let path = self.path_for(&record.task_id);
        let what = path.display().to_string();
        retry_until_ok(&self.persist_retry, &what, || {
            let json = serde_json::to_vec_pretty(record)?;
            self.fs.write_atomic(&path, &json)
        })
        .await;
        debug!(task = %record.task_id, status = %record.status, "result recorded");
    }

    /// Whether a result exists for `task_id`.
    pub fn contains(&self, task_id: &str) -> bool {
        self.fs.is_file(&self.path_for(task_id))
    }

    /// `Ok(None)` for unknown ids; not-yet-run tasks have no record.
    pub fn get(&self, task_id: &str) -> Result<Option<ResultRecord>> {
        let path = self.path_for(task_id);
        if !self.fs.is_file(&path) {
            return Ok(None);
        }
        let contents = self.fs.read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    /// Every readable record, newest `completed_at` first. Unparsable files
    /// are skipped with a warning.
    pub fn all(&self) -> Result<Vec<ResultRecord>> {
        if !self.fs.is_dir(&self.dir) {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for path in self.fs.read_dir(&self.dir)? {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.starts_with('.') || !name.ends_with(".json") {
                continue;
            }
            let parsed = self
                .fs
                .read_to_string(&path)
                .and_then(|s| Ok(serde_json::from_str::<ResultRecord>(&s)?));
            match parsed {
                Ok(record) => records.push(record),
                Err(err) => warn!(path = %path.display(), error = %format!("{err:#}"), "skipping unreadable result file"),
            }
        }

        records.sort_by(|a, b| {
            b.completed_at
                .cmp(&a.completed_at)
                .then_with(|| b.task_id.cmp(&a.task_id))
        });
        Ok(records)
    }

    /// The `n` most recently completed records.
    pub fn recent(&self, n: usize) -> Result<Vec<ResultRecord>> {
        let mut all = self.all()?;
        all.truncate(n);
        Ok(all)
    }
}
