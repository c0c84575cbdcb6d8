// tests/queue_ordering.rs

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use taskmon::engine::Dispatcher;
use taskmon::fs::{FileSystem, RealFileSystem};
use taskmon::task::{TaskNamePattern, TaskRecord};
use taskmon::types::TaskStatus;
use taskmon_test_utils::{
    ConfigFileBuilder, FakeEngine, ProjectFixture, eventually, init_tracing, registry_of,
    with_timeout,
};

type TestResult = Result<(), Box<dyn Error>>;

fn dispatcher(engine: &FakeEngine) -> Dispatcher {
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    Dispatcher::new(
        ConfigFileBuilder::new().build_arc(),
        Arc::new(engine.clone()),
        fs,
    )
    .expect("dispatcher")
    .without_watchers()
}

fn record_for(project: &ProjectFixture, pattern: &TaskNamePattern, file: &str) -> TaskRecord {
    let name = pattern.parse(file).expect("valid task name");
    TaskRecord::queued(&project.name, &name, project.tasks_dir().join(file), Utc::now())
}

async fn wait_for_results(project: &ProjectFixture, ids: &[&str]) -> bool {
    eventually(Duration::from_secs(5), || {
        ids.iter().all(|id| project.result(id).is_some())
    })
    .await
}

#[tokio::test]
async fn tasks_run_in_arrival_order() -> TestResult {
    init_tracing();

    let alpha = ProjectFixture::new("alpha");
    let files = [
        "task-20260101-100300-third.md",
        "task-20260101-100100-first.md",
        "task-20260101-100200-second.md",
    ];
    for file in files {
        alpha.drop_task(file, "do it");
    }

    let engine = FakeEngine::new().with_default_delay(Duration::from_millis(20));
    let mut dispatcher = dispatcher(&engine);
    let pattern = dispatcher.pattern().clone();
    dispatcher.start(&registry_of(&[&alpha])).await?;

    let queue = dispatcher.queue("alpha").expect("alpha queue");
    // Enqueued while the recovered backlog is running; names deliberately
    // sort before the backlog.
    for file in ["task-20260101-090000-late-b.md", "task-20260101-080000-late-a.md"] {
        alpha.drop_task(file, "later");
        assert!(queue.enqueue(record_for(&alpha, &pattern, file)).await);
    }

    let expected = [
        "task-20260101-100100-first",
        "task-20260101-100200-second",
        "task-20260101-100300-third",
        "task-20260101-090000-late-b",
        "task-20260101-080000-late-a",
    ];
    assert!(wait_for_results(&alpha, &expected).await, "not every task finished");
    assert_eq!(engine.started_order("alpha"), expected);

    for id in expected {
        let result = alpha.result(id).expect("result");
        assert_eq!(result.status, TaskStatus::Completed);
        assert_eq!(result.summary, format!("done {id}"));
        assert_eq!(result.attempt, 1);
    }

    with_timeout(dispatcher.shutdown()).await;
    Ok(())
}

#[tokio::test]
async fn one_task_at_a_time_per_project() -> TestResult {
    init_tracing();

    let alpha = ProjectFixture::new("alpha");
    let ids: Vec<String> = (0..6)
        .map(|i| format!("task-20260101-1000{i:02}-job-{i}"))
        .collect();
    for id in &ids {
        alpha.drop_task(&format!("{id}.md"), "work");
    }

    let engine = FakeEngine::new().with_default_delay(Duration::from_millis(30));
    let mut dispatcher = dispatcher(&engine);
    dispatcher.start(&registry_of(&[&alpha])).await?;

    let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    assert!(wait_for_results(&alpha, &id_refs).await);
    assert_eq!(engine.max_concurrency("alpha"), 1);

    // No attempt may start before the previous one finished.
    let invocations = engine.invocations();
    for pair in invocations.windows(2) {
        let finished = pair[0].finished.expect("first attempt finished");
        assert!(pair[1].started >= finished);
    }

    with_timeout(dispatcher.shutdown()).await;
    Ok(())
}

#[tokio::test]
async fn projects_do_not_wait_for_each_other() -> TestResult {
    init_tracing();

    let alpha = ProjectFixture::new("alpha");
    let beta = ProjectFixture::new("beta");
    alpha.drop_task("task-20260101-100000-slow.md", "slow");
    beta.drop_task("task-20260101-100000-quick-one.md", "quick");
    beta.drop_task("task-20260101-100001-quick-two.md", "quick");

    let engine = FakeEngine::new()
        .with_default_delay(Duration::from_millis(10))
        .with_delay("task-20260101-100000-slow", Duration::from_secs(2));
    let mut dispatcher = dispatcher(&engine);
    dispatcher.start(&registry_of(&[&alpha, &beta])).await?;

    assert!(
        wait_for_results(
            &beta,
            &["task-20260101-100000-quick-one", "task-20260101-100001-quick-two"]
        )
        .await
    );
    // Beta finished both tasks while alpha's only task is still running.
    assert!(alpha.result("task-20260101-100000-slow").is_none());
    assert!(
        eventually(Duration::from_secs(1), || {
            alpha.snapshot().and_then(|s| s.current_id).as_deref()
                == Some("task-20260101-100000-slow")
        })
        .await
    );
    assert_eq!(engine.max_concurrency("alpha"), 1);
    assert_eq!(engine.max_concurrency("beta"), 1);

    with_timeout(dispatcher.shutdown()).await;
    assert!(alpha.result("task-20260101-100000-slow").is_some());
    Ok(())
}
