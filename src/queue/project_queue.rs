// src/queue/project_queue.rs

//! FIFO queue of one project.
//!
//! All mutations happen under a single async mutex and persist the resulting
//! snapshot before the lock is released, so the on-disk snapshot always
//! reflects an acknowledged state and operations are linearizable.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::queue::state_store::{QueueSnapshot, QueueStateStore};
use crate::retry::{RetryPolicy, retry_until_ok};
use crate::task::TaskRecord;
use crate::types::TaskStatus;

#[derive(Debug, Default)]
struct QueueInner {
    pending: VecDeque<TaskRecord>,
    current: Option<TaskRecord>,
}

impl QueueInner {
    fn contains(&self, id: &str) -> bool {
        self.current.as_ref().is_some_and(|c| c.id == id)
            || self.pending.iter().any(|r| r.id == id)
    }

    fn snapshot(&self, project: &str) -> QueueSnapshot {
        QueueSnapshot::new(
            project,
            self.pending.iter().map(|r| r.id.clone()).collect(),
            self.current.as_ref().map(|r| r.id.clone()),
            Utc::now(),
        )
    }
}

#[derive(Debug)]
pub struct ProjectQueue {
    project: String,
    inner: Mutex<QueueInner>,
    ready: Notify,
    /// Set when the project is disabled; no further enqueues are accepted.
    closed: AtomicBool,
    store: QueueStateStore,
    persist_retry: RetryPolicy,
}

impl ProjectQueue {
    pub fn new(project: impl Into<String>, store: QueueStateStore, persist_retry: RetryPolicy) -> Self {
        Self {
            project: project.into(),
            inner: Mutex::new(QueueInner::default()),
            ready: Notify::new(),
            closed: AtomicBool::new(false),
            store,
            persist_retry,
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// Refuse every later [`enqueue`](Self::enqueue). An enqueue that already
    /// holds the lock still completes. Pending and running tasks are kept.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Append a queued record. Returns `false` (and changes nothing) when a
    /// task with the same id is already pending or running, or the queue is
    /// closed.
    pub async fn enqueue(&self, record: TaskRecord) -> bool {
        if record.status() != TaskStatus::Queued {
            warn!(
                project = %self.project,
                task = %record.id,
                status = %record.status(),
                "refusing to enqueue a task that is not queued"
            );
            return false;
        }

        let mut inner = self.inner.lock().await;
        if self.is_closed() {
            debug!(project = %self.project, task = %record.id, "queue closed; refusing task");
            return false;
        }
        if inner.contains(&record.id) {
            debug!(project = %self.project, task = %record.id, "task already queued; ignoring");
            return false;
        }

        let id = record.id.clone();
        inner.pending.push_back(record);
        self.persist(&inner).await;
        let depth = inner.pending.len();
        drop(inner);

        info!(project = %self.project, task = %id, depth, "task enqueued");
        self.ready.notify_one();
        true
    }

    /// Seed the queue with recovered records, preserving their order.
    /// Records whose id is already present are skipped.
    pub async fn restore(&self, records: Vec<TaskRecord>) -> usize {
        let mut inner = self.inner.lock().await;
        let mut added = 0;
        for record in records {
            if record.status() != TaskStatus::Queued || inner.contains(&record.id) {
                continue;
            }
            inner.pending.push_back(record);
            added += 1;
        }
        self.persist(&inner).await;
        let has_work = !inner.pending.is_empty();
        drop(inner);

        if has_work {
            self.ready.notify_one();
        }
        added
    }

    /// Resolves once there is a task that [`try_dequeue`](Self::try_dequeue)
    /// could hand out. Cancel-safe.
    pub async fn wait_for_pending(&self) {
        loop {
            {
                let inner = self.inner.lock().await;
                if inner.current.is_none() && !inner.pending.is_empty() {
                    return;
                }
            }
            self.ready.notified().await;
        }
    }

    /// Move the head of the queue into the running slot.
    ///
    /// Returns `Ok(None)` when nothing is pending or another task of this
    /// project is still running.
    pub async fn try_dequeue(&self) -> Result<Option<TaskRecord>> {
        let mut inner = self.inner.lock().await;
        if inner.current.is_some() {
            return Ok(None);
        }
        let Some(mut record) = inner.pending.pop_front() else {
            return Ok(None);
        };

        if let Err(err) = record.start(Utc::now()) {
            // Only queued records are ever accepted, so this record is
            // corrupt; drop it rather than spin on it.
            self.persist(&inner).await;
            return Err(err);
        }
        inner.current = Some(record.clone());
        self.persist(&inner).await;

        debug!(
            project = %self.project,
            task = %record.id,
            remaining = inner.pending.len(),
            "task dequeued"
        );
        Ok(Some(record))
    }

    /// Wait for the next task and mark it running.
    pub async fn dequeue_next(&self) -> Result<TaskRecord> {
        loop {
            if let Some(record) = self.try_dequeue().await? {
                return Ok(record);
            }
            self.wait_for_pending().await;
        }
    }

    /// Release the running slot held by `id`. Returns `false` if `id` is not
    /// the running task.
    pub async fn complete(&self, id: &str) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.current.as_ref().is_none_or(|c| c.id != id) {
            warn!(project = %self.project, task = %id, "complete called for a task that is not running");
            return false;
        }
        inner.current = None;
        self.persist(&inner).await;
        let has_work = !inner.pending.is_empty();
        drop(inner);

        if has_work {
            self.ready.notify_one();
        }
        true
    }

    /// Current in-memory state.
    pub async fn snapshot(&self) -> QueueSnapshot {
        self.inner.lock().await.snapshot(&self.project)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.pending.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Write the snapshot, retrying with back-off until it sticks. Called
    /// with the queue lock held so no later state can overtake it.
    async fn persist(&self, inner: &QueueInner) {
        let snapshot = inner.snapshot(&self.project);
        let what = self.store.path().display().to_string();
        retry_until_ok(&self.persist_retry, &what, || self.store.save(&snapshot)).await;
    }
}
