// src/queue/recovery.rs

//! Rebuild a project's queue at startup.
//!
//! 1. Load the last snapshot; an interrupted `current_id` goes back to the
//!    front of the pending list.
//! 2. Re-scan the tasks directory and append every well-formed task file
//!    that is neither pending nor already in the result history, in
//!    file-name order (which is timestamp order).

use std::collections::HashSet;

use chrono::Utc;
use tracing::{info, warn};

use crate::config::ProjectPaths;
use crate::errors::Result;
use crate::fs::FileSystem;
use crate::queue::state_store::QueueStateStore;
use crate::store::ResultStore;
use crate::task::{TaskNamePattern, TaskRecord};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Task that was running when the previous process stopped.
    pub interrupted: Option<String>,
    /// Pending ids carried over from the snapshot.
    pub restored: usize,
    /// Task files found by the directory re-scan.
    pub discovered: usize,
}

/// Work out the queued records a project should start with.
pub fn recover_project(
    project: &str,
    paths: &ProjectPaths,
    pattern: &TaskNamePattern,
    state: &QueueStateStore,
    results: &ResultStore,
    fs: &dyn FileSystem,
) -> Result<(Vec<TaskRecord>, RecoveryReport)> {
    let now = Utc::now();
    let mut report = RecoveryReport::default();
    let mut records = Vec::new();
    let mut known: HashSet<String> = HashSet::new();

    let snapshot = match state.load() {
        Ok(snapshot) => snapshot,
        Err(err) => {
            warn!(
                project,
                path = %state.path().display(),
                error = %err,
                "queue snapshot unreadable; rebuilding from the tasks directory"
            );
            None
        }
    };

    if let Some(mut snapshot) = snapshot {
        report.interrupted = snapshot.recover_interrupted();
        if let Some(id) = &report.interrupted {
            info!(project, task = %id, "requeueing task interrupted by previous shutdown");
        }

        for id in snapshot.pending_ids {
            let file_name = pattern.file_name_for(&id);
            let Some(name) = pattern.parse(&file_name) else {
                warn!(project, task = %id, "dropping snapshot id that no longer matches the task naming pattern");
                continue;
            };
            let source = paths.tasks.join(&file_name);
            if !fs.is_file(&source) {
                warn!(project, task = %id, "task file missing; it will fail when dequeued");
            }
            known.insert(id.clone());
            records.push(TaskRecord::queued(project, &name, source, now));
            report.restored += 1;
        }
    }

    let mut discovered = Vec::new();
    if fs.is_dir(&paths.tasks) {
        for path in fs.read_dir(&paths.tasks)? {
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(name) = pattern.parse(file_name) else {
                if pattern.glob_matches(file_name) {
                    warn!(project, file = %file_name, "ignoring malformed task file name (bad timestamp or slug)");
                }
                continue;
            };
            if known.contains(&name.id) || results.contains(&name.id) || !fs.is_file(&path) {
                continue;
            }
            discovered.push((name, path));
        }
    }
    discovered.sort_by(|a, b| a.0.id.cmp(&b.0.id));
    report.discovered = discovered.len();

    for (name, path) in discovered {
        records.push(TaskRecord::queued(project, &name, path, now));
    }

    Ok((records, report))
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use super::*;
    use crate::config::Layout;
    use crate::fs::mock::MockFileSystem;
    use crate::queue::state_store::QueueSnapshot;
    use crate::retry::RetryPolicy;
    use crate::store::ResultRecord;
    use crate::types::TaskStatus;

    struct Fixture {
        fs: Arc<MockFileSystem>,
        paths: ProjectPaths,
        pattern: TaskNamePattern,
        state: QueueStateStore,
        results: ResultStore,
    }

    fn fixture() -> Fixture {
        let fs = Arc::new(MockFileSystem::new());
        let paths = Layout::default().project_paths(Path::new("/p"));
        fs.create_dir_all(&paths.tasks).unwrap();
        Fixture {
            state: QueueStateStore::new(&paths.state, fs.clone()),
            results: ResultStore::new(&paths.results, fs.clone(), RetryPolicy::immediate()),
            pattern: TaskNamePattern::new("task", "md").unwrap(),
            paths,
            fs,
        }
    }

    impl Fixture {
        fn recover(&self) -> (Vec<String>, RecoveryReport) {
            let (records, report) = recover_project(
                "p",
                &self.paths,
                &self.pattern,
                &self.state,
                &self.results,
                self.fs.as_ref(),
            )
            .unwrap();
            (records.into_iter().map(|r| r.id).collect(), report)
        }

        fn task_file(&self, name: &str) {
            self.fs.add_file(self.paths.tasks.join(name), "do it");
        }
    }

    #[test]
    fn scan_orders_by_timestamp_and_ignores_noise() {
        let f = fixture();
        f.task_file("task-20260101-100002-c.md");
        f.task_file("task-20260101-100000-a.md");
        f.task_file("notes.txt");
        f.task_file("task-20260101-100001-b.md");

        let (ids, report) = f.recover();
        assert_eq!(
            ids,
            vec![
                "task-20260101-100000-a",
                "task-20260101-100001-b",
                "task-20260101-100002-c"
            ]
        );
        assert_eq!(report.discovered, 3);
        assert!(report.interrupted.is_none());
    }

    #[test]
    fn interrupted_task_leads_and_snapshot_order_is_kept() {
        let f = fixture();
        for name in [
            "task-20260101-100000-a.md",
            "task-20260101-100001-b.md",
            "task-20260101-100002-c.md",
        ] {
            f.task_file(name);
        }
        f.state
            .save(&QueueSnapshot::new(
                "p",
                vec!["task-20260101-100002-c".into()],
                Some("task-20260101-100001-b".into()),
                Utc::now(),
            ))
            .unwrap();

        let (ids, report) = f.recover();
        assert_eq!(
            ids,
            vec![
                "task-20260101-100001-b",
                "task-20260101-100002-c",
                "task-20260101-100000-a"
            ]
        );
        assert_eq!(report.interrupted.as_deref(), Some("task-20260101-100001-b"));
        assert_eq!(report.restored, 2);
        assert_eq!(report.discovered, 1);
    }

    #[tokio::test]
    async fn tasks_with_results_are_not_rediscovered() {
        let f = fixture();
        f.task_file("task-20260101-100000-a.md");
        f.task_file("task-20260101-100001-b.md");
        let now = Utc::now();
        f.results
            .record(&ResultRecord {
                task_id: "task-20260101-100000-a".into(),
                project: "p".into(),
                status: TaskStatus::Completed,
                attempt: 1,
                started_at: now,
                completed_at: now,
                duration_seconds: 0.0,
                summary: "Task completed".into(),
                output: String::new(),
                error: None,
            })
            .await;

        let (ids, _) = f.recover();
        assert_eq!(ids, vec!["task-20260101-100001-b"]);
    }

    #[test]
    fn corrupt_snapshot_falls_back_to_scan() {
        let f = fixture();
        f.task_file("task-20260101-100000-a.md");
        f.fs.add_file(f.state.path(), "{{{");

        let (ids, report) = f.recover();
        assert_eq!(ids, vec!["task-20260101-100000-a"]);
        assert_eq!(report.restored, 0);
    }

    #[test]
    fn missing_task_file_is_still_restored() {
        let f = fixture();
        f.state
            .save(&QueueSnapshot::new(
                "p",
                vec!["task-20260101-100000-gone".into()],
                None,
                Utc::now(),
            ))
            .unwrap();

        let (ids, _) = f.recover();
        assert_eq!(ids, vec!["task-20260101-100000-gone"]);
    }
}
