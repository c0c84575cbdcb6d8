// src/engine/worker_loop.rs

//! The sequential worker loop of one project.
//!
//! `Idle -> Running(task) -> Idle -> ...` until the stop flag is raised. A
//! stop request never interrupts a running task; the loop exits the next
//! time it would wait for work.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::engine::LoopState;
use crate::exec::TaskExecutor;
use crate::queue::ProjectQueue;

pub async fn run_worker_loop(
    queue: Arc<ProjectQueue>,
    executor: TaskExecutor,
    mut stop_rx: watch::Receiver<bool>,
    state_tx: watch::Sender<LoopState>,
) {
    let project = queue.project().to_string();
    info!(project = %project, "worker loop started");
    state_tx.send_replace(LoopState::Idle);

    loop {
        if *stop_rx.borrow_and_update() {
            break;
        }

        tokio::select! {
            biased;
            changed = stop_rx.changed() => {
                // A dropped sender counts as a stop request.
                if changed.is_err() {
                    break;
                }
                continue;
            }
            _ = queue.wait_for_pending() => {}
        }

        let mut record = match queue.try_dequeue().await {
            Ok(Some(record)) => record,
            Ok(None) => continue,
            Err(err) => {
                error!(project = %project, error = %err, "dropping task that could not be started");
                continue;
            }
        };

        state_tx.send_replace(LoopState::Running(record.id.clone()));
        let result = executor.execute(&mut record).await;
        debug!(
            project = %project,
            task = %record.id,
            status = %result.status,
            attempts = record.attempt,
            "task reached terminal state"
        );

        // Release the token regardless of outcome.
        queue.complete(&record.id).await;
        state_tx.send_replace(LoopState::Idle);
    }

    state_tx.send_replace(LoopState::Stopped);
    info!(project = %project, "worker loop stopped");
}
