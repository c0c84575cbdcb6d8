// tests/queue_properties.rs

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use proptest::prelude::*;

use taskmon::fs::mock::MockFileSystem;
use taskmon::queue::{ProjectQueue, QueueSnapshot, QueueStateStore};
use taskmon::retry::RetryPolicy;
use taskmon::task::{TaskNamePattern, TaskRecord};

fn task_id(n: u8) -> String {
    format!("task-20260101-1000{:02}-t{n}", n % 60)
}

fn record(pattern: &TaskNamePattern, n: u8) -> TaskRecord {
    let file = format!("{}.md", task_id(n));
    let name = pattern.parse(&file).expect("valid task name");
    TaskRecord::queued("p", &name, format!("/p/tasks/{file}"), Utc::now())
}

/// Interleaving of enqueues (by task number) and dequeue-then-complete steps.
#[derive(Debug, Clone)]
enum Op {
    Enqueue(u8),
    Run,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0u8..40).prop_map(Op::Enqueue),
        1 => Just(Op::Run),
    ]
}

fn block_on<F: std::future::Future>(f: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
        .block_on(f)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn tasks_leave_the_queue_in_first_arrival_order(ops in proptest::collection::vec(op_strategy(), 1..60)) {
        let pattern = TaskNamePattern::new("task", "md").unwrap();
        let fs = Arc::new(MockFileSystem::new());
        let store = QueueStateStore::new(Path::new("/p/state"), fs);
        let queue = ProjectQueue::new("p", store.clone(), RetryPolicy::immediate());

        let (accepted, ran) = block_on(async {
            let mut accepted: Vec<String> = Vec::new();
            let mut ran: Vec<String> = Vec::new();
            for op in &ops {
                match op {
                    Op::Enqueue(n) => {
                        if queue.enqueue(record(&pattern, *n)).await {
                            accepted.push(task_id(*n));
                        }
                    }
                    Op::Run => {
                        if let Some(r) = queue.try_dequeue().await.unwrap() {
                            // The token is held until complete.
                            assert!(queue.try_dequeue().await.unwrap().is_none());
                            ran.push(r.id.clone());
                            assert!(queue.complete(&r.id).await);
                        }
                    }
                }
                let snap = store.load().unwrap().unwrap();
                assert!(snap.is_consistent());
            }
            while let Some(r) = queue.try_dequeue().await.unwrap() {
                ran.push(r.id.clone());
                queue.complete(&r.id).await;
            }
            (accepted, ran)
        });

        // Every accepted enqueue runs exactly once, in acceptance order.
        prop_assert_eq!(ran, accepted);
    }

    #[test]
    fn recovered_snapshot_is_consistent_and_keeps_the_interrupted_task_first(
        pending in proptest::collection::vec(0u8..20, 0..15),
        current in proptest::option::of(0u8..20),
    ) {
        let mut snap = QueueSnapshot::new(
            "p",
            pending.iter().map(|n| task_id(*n)).collect(),
            current.map(task_id),
            Utc::now(),
        );
        let requeued = snap.recover_interrupted();

        prop_assert!(snap.is_consistent());
        prop_assert!(snap.current_id.is_none());
        prop_assert_eq!(requeued.clone(), current.map(task_id));
        if let Some(id) = requeued {
            prop_assert_eq!(snap.pending_ids.first(), Some(&id));
        }
        for n in &pending {
            prop_assert!(snap.pending_ids.contains(&task_id(*n)));
        }
    }
}
