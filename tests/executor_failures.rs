// tests/executor_failures.rs

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use taskmon::config::ConfigFile;
use taskmon::engine::Dispatcher;
use taskmon::fs::{FileSystem, RealFileSystem};
use taskmon::task::TaskRecord;
use taskmon::types::{FailureKind, TaskStatus};
use taskmon_test_utils::{
    ConfigFileBuilder, FakeEngine, ProjectFixture, Script, eventually, init_tracing,
    registry_of, with_timeout,
};

type TestResult = Result<(), Box<dyn Error>>;

async fn start(config: ConfigFile, engine: &FakeEngine, project: &ProjectFixture) -> Dispatcher {
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let mut dispatcher = Dispatcher::new(Arc::new(config), Arc::new(engine.clone()), fs)
        .expect("dispatcher")
        .without_watchers();
    dispatcher
        .start(&registry_of(&[project]))
        .await
        .expect("project starts");
    dispatcher
}

#[tokio::test]
async fn hung_task_times_out_and_the_next_one_runs() -> TestResult {
    init_tracing();

    let alpha = ProjectFixture::new("alpha");
    let stuck = "task-20260101-100000-stuck";
    let next = "task-20260101-100001-next";
    alpha.drop_task(&format!("{stuck}.md"), "never ends");
    alpha.drop_task(&format!("{next}.md"), "quick");

    let engine = FakeEngine::new().with_script(stuck, vec![Script::Hang]);
    let config = ConfigFileBuilder::new()
        .timeout("200ms")
        .max_attempts(1)
        .build();
    let mut dispatcher = start(config, &engine, &alpha).await;

    assert!(eventually(Duration::from_secs(5), || alpha.result(next).is_some()).await);

    let timed_out = alpha.result(stuck).expect("stuck result");
    assert_eq!(timed_out.status, TaskStatus::Failed);
    assert_eq!(timed_out.summary, "Task timed out");
    let failure = timed_out.error.expect("failure details");
    assert_eq!(failure.kind, FailureKind::Timeout);
    assert!(failure.message.contains("timeout"));

    assert_eq!(alpha.result(next).map(|r| r.status), Some(TaskStatus::Completed));
    // The abandoned attempt no longer counts as running.
    assert_eq!(engine.max_concurrency("alpha"), 1);

    with_timeout(dispatcher.shutdown()).await;
    Ok(())
}

#[tokio::test]
async fn timeouts_are_retried_up_to_max_attempts() -> TestResult {
    init_tracing();

    let alpha = ProjectFixture::new("alpha");
    let id = "task-20260101-100000-flaky";
    alpha.drop_task(&format!("{id}.md"), "eventually fine");

    let engine = FakeEngine::new().with_script(id, vec![Script::Hang, Script::Succeed]);
    let config = ConfigFileBuilder::new()
        .timeout("150ms")
        .max_attempts(2)
        .build();
    let mut dispatcher = start(config, &engine, &alpha).await;

    assert!(
        eventually(Duration::from_secs(5), || {
            alpha.result(id).is_some_and(|r| r.attempt == 2)
        })
        .await
    );
    let result = alpha.result(id).expect("result");
    assert_eq!(result.status, TaskStatus::Completed);
    assert!(result.error.is_none());
    assert_eq!(engine.attempts_of(id), 2);

    with_timeout(dispatcher.shutdown()).await;
    Ok(())
}

#[tokio::test]
async fn transient_errors_retry_until_attempts_run_out() -> TestResult {
    init_tracing();

    let alpha = ProjectFixture::new("alpha");
    let recovers = "task-20260101-100000-recovers";
    let gives_up = "task-20260101-100001-gives-up";
    alpha.drop_task(&format!("{recovers}.md"), "a");
    alpha.drop_task(&format!("{gives_up}.md"), "b");

    let engine = FakeEngine::new()
        .with_script(
            recovers,
            vec![
                Script::Transient("connection reset".into()),
                Script::Transient("connection reset".into()),
            ],
        )
        .with_script(
            gives_up,
            vec![
                Script::Transient("engine offline".into()),
                Script::Transient("engine offline".into()),
                Script::Transient("engine offline".into()),
            ],
        );
    let config = ConfigFileBuilder::new().max_attempts(3).build();
    let mut dispatcher = start(config, &engine, &alpha).await;

    assert!(
        eventually(Duration::from_secs(5), || {
            alpha.result(gives_up).is_some_and(|r| r.attempt == 3)
        })
        .await
    );

    let ok = alpha.result(recovers).expect("result");
    assert_eq!(ok.status, TaskStatus::Completed);
    assert_eq!(ok.attempt, 3);

    let failed = alpha.result(gives_up).expect("result");
    assert_eq!(failed.status, TaskStatus::Failed);
    let failure = failed.error.expect("failure");
    assert_eq!(failure.kind, FailureKind::Transient);
    assert_eq!(failure.message, "engine offline");
    assert_eq!(engine.attempts_of(gives_up), 3);

    with_timeout(dispatcher.shutdown()).await;

    // Every attempt is appended to the task transcript.
    let log = std::fs::read_to_string(alpha.paths().logs.join(format!("{gives_up}.log")))?;
    assert_eq!(log.matches("=== ").count(), 3);
    Ok(())
}

#[tokio::test]
async fn engine_failures_are_final() -> TestResult {
    init_tracing();

    let alpha = ProjectFixture::new("alpha");
    let durable = "task-20260101-100000-durable";
    let reported = "task-20260101-100001-reported";
    let after = "task-20260101-100002-after";
    for id in [durable, reported, after] {
        alpha.drop_task(&format!("{id}.md"), "x");
    }

    let engine = FakeEngine::new()
        .with_script(durable, vec![Script::Durable("bad request".into())])
        .with_script(reported, vec![Script::Fail("tests failed".into())]);
    let config = ConfigFileBuilder::new().max_attempts(3).build();
    let mut dispatcher = start(config, &engine, &alpha).await;

    assert!(eventually(Duration::from_secs(5), || alpha.result(after).is_some()).await);

    for (id, message) in [(durable, "bad request"), (reported, "tests failed")] {
        let result = alpha.result(id).expect("result");
        assert_eq!(result.status, TaskStatus::Failed);
        assert_eq!(result.attempt, 1);
        let failure = result.error.expect("failure");
        assert_eq!(failure.kind, FailureKind::Engine);
        assert_eq!(failure.message, message);
        assert_eq!(engine.attempts_of(id), 1);
    }
    assert_eq!(alpha.result(after).map(|r| r.status), Some(TaskStatus::Completed));

    with_timeout(dispatcher.shutdown()).await;
    Ok(())
}

#[tokio::test]
async fn task_file_removed_after_enqueue_fails_without_running() -> TestResult {
    init_tracing();

    let alpha = ProjectFixture::new("alpha");
    let engine = FakeEngine::new();
    let mut dispatcher = start(ConfigFileBuilder::new().build(), &engine, &alpha).await;

    let file = "task-20260101-100000-gone.md";
    let name = dispatcher.pattern().parse(file).expect("valid name");
    let record = TaskRecord::queued("alpha", &name, alpha.tasks_dir().join(file), Utc::now());
    let queue = dispatcher.queue("alpha").expect("queue");
    assert!(queue.enqueue(record).await);

    let id = "task-20260101-100000-gone";
    assert!(eventually(Duration::from_secs(5), || alpha.result(id).is_some()).await);

    let result = alpha.result(id).expect("result");
    assert_eq!(result.status, TaskStatus::Failed);
    assert_eq!(
        result.error.map(|f| f.kind),
        Some(FailureKind::TaskFileUnreadable)
    );
    assert_eq!(engine.attempts_of(id), 0);

    with_timeout(dispatcher.shutdown()).await;
    Ok(())
}
