// tests/persistence_backoff.rs

use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use taskmon::config::{Layout, ProjectEntry, Registry};
use taskmon::engine::Dispatcher;
use taskmon::fs::FileSystem;
use taskmon::fs::mock::MockFileSystem;
use taskmon::queue::{ProjectQueue, QueueStateStore};
use taskmon::retry::RetryPolicy;
use taskmon::store::ResultStore;
use taskmon::task::{TaskNamePattern, TaskRecord};
use taskmon::types::TaskStatus;
use taskmon_test_utils::{ConfigFileBuilder, FakeEngine, eventually, init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn record(file: &str) -> TaskRecord {
    let name = TaskNamePattern::new("task", "md")
        .expect("pattern")
        .parse(file)
        .expect("valid task name");
    TaskRecord::queued("alpha", &name, format!("/alpha/tasks/{file}"), Utc::now())
}

#[tokio::test]
async fn enqueue_is_acknowledged_only_after_the_snapshot_sticks() -> TestResult {
    init_tracing();

    let fs = Arc::new(MockFileSystem::new());
    let store = QueueStateStore::new(Path::new("/alpha/state"), fs.clone());
    let queue = ProjectQueue::new("alpha", store.clone(), RetryPolicy::immediate());

    fs.fail_next_writes(3);
    assert!(with_timeout(queue.enqueue(record("task-20260101-100000-a.md"))).await);

    let snapshot = store.load()?.expect("snapshot written");
    assert_eq!(snapshot.pending_ids, vec!["task-20260101-100000-a"]);
    assert_eq!(fs.write_count(), 1);
    Ok(())
}

#[tokio::test]
async fn failed_writes_back_off_between_attempts() -> TestResult {
    init_tracing();

    let fs = Arc::new(MockFileSystem::new());
    let store = QueueStateStore::new(Path::new("/alpha/state"), fs.clone());
    let policy = RetryPolicy::new(Duration::from_millis(40), 2.0, Duration::from_millis(100));
    let queue = ProjectQueue::new("alpha", store, policy);

    // 40ms + 80ms + 100ms (capped)
    fs.fail_next_writes(3);
    let started = tokio::time::Instant::now();
    queue.enqueue(record("task-20260101-100000-a.md")).await;
    assert!(started.elapsed() >= Duration::from_millis(220));
    Ok(())
}

#[tokio::test]
async fn result_writes_retry_until_they_succeed() -> TestResult {
    init_tracing();

    let fs = Arc::new(MockFileSystem::new());
    let results = ResultStore::new(
        Path::new("/alpha/results"),
        fs.clone(),
        RetryPolicy::immediate(),
    );
    let now = Utc::now();
    let result = taskmon::store::ResultRecord {
        task_id: "task-20260101-100000-a".into(),
        project: "alpha".into(),
        status: TaskStatus::Completed,
        attempt: 1,
        started_at: now,
        completed_at: now,
        duration_seconds: 0.0,
        summary: "Task completed".into(),
        output: String::new(),
        error: None,
    };

    fs.fail_next_writes(5);
    with_timeout(results.record(&result)).await;
    assert_eq!(results.get("task-20260101-100000-a")?, Some(result));
    Ok(())
}

#[tokio::test]
async fn worker_keeps_going_through_write_failures() -> TestResult {
    init_tracing();

    let fs = Arc::new(MockFileSystem::new());
    let root = Path::new("/alpha");
    let paths = Layout::default().project_paths(root);
    fs.create_dir_all(&paths.tasks)?;
    fs.add_file(paths.tasks.join("task-20260101-100000-a.md"), "first");
    fs.add_file(paths.tasks.join("task-20260101-100001-b.md"), "second");

    let engine = FakeEngine::new();
    let fs_dyn: Arc<dyn FileSystem> = fs.clone();
    let mut dispatcher = Dispatcher::new(
        ConfigFileBuilder::new().build_arc(),
        Arc::new(engine.clone()),
        fs_dyn,
    )?
    .without_watchers();

    fs.fail_next_writes(4);
    let registry = Registry::from_entries([ProjectEntry::new("alpha", root, true)]);
    dispatcher.start(&registry).await?;

    let results = dispatcher.results("alpha").expect("results store");
    assert!(
        eventually(Duration::from_secs(5), || {
            results.contains("task-20260101-100001-b")
        })
        .await
    );
    assert_eq!(
        engine.started_order("alpha"),
        vec!["task-20260101-100000-a", "task-20260101-100001-b"]
    );
    with_timeout(dispatcher.shutdown()).await;

    let snapshot = QueueStateStore::new(&paths.state, fs.clone())
        .load()?
        .expect("snapshot");
    assert!(snapshot.pending_ids.is_empty());
    assert!(snapshot.current_id.is_none());
    Ok(())
}
