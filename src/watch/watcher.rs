// src/watch/watcher.rs

use std::time::Duration;

use anyhow::{Context, Result};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::watch::dedup::RecentEvents;
use crate::watch::event_handler::{WatchContext, is_arrival, process_task_path, sweep_tasks_dir};

/// Handle for one project's filesystem watcher.
///
/// Dropping the handle stops observing and aborts the event task, so a path
/// that is still settling is never enqueued afterwards.
pub struct WatcherHandle {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle")
            .field("finished", &self.task.is_finished())
            .finish()
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Watch `ctx.tasks_dir` (non-recursively) and enqueue qualifying files.
///
/// After registration the directory is swept once so nothing that arrived
/// before the watch was in place is lost.
pub fn spawn_project_watcher(ctx: WatchContext) -> Result<WatcherHandle> {
    // Channel from the blocking notify callback into the async world.
    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel::<Event>();

    let project = ctx.project.clone();
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                // Receiver gone means the watcher is being torn down.
                let _ = event_tx.send(event);
            }
            Err(err) => {
                warn!(project = %project, error = %err, "file watch error");
            }
        },
        Config::default(),
    )
    .context("creating filesystem watcher")?;

    watcher
        .watch(&ctx.tasks_dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("watching {}", ctx.tasks_dir.display()))?;

    info!(project = %ctx.project, dir = %ctx.tasks_dir.display(), "task watcher started");

    let task = tokio::spawn(async move {
        let mut recent = RecentEvents::new(ctx.settings.duplicate_window);
        sweep_tasks_dir(&ctx, &mut recent).await;

        while let Some(event) = event_rx.recv().await {
            if !is_arrival(&event.kind) {
                continue;
            }
            debug!(project = %ctx.project, ?event, "received notify event");
            for path in &event.paths {
                process_task_path(&ctx, path, &mut recent).await;
            }
        }
        debug!(project = %ctx.project, "watcher event loop finished");
    });

    Ok(WatcherHandle {
        _watcher: watcher,
        task,
    })
}

/// [`spawn_project_watcher`] with up to `attempts` tries, pausing between
/// failures.
pub async fn spawn_with_retries(
    ctx: WatchContext,
    attempts: u32,
    pause: Duration,
) -> Result<WatcherHandle> {
    let attempts = attempts.max(1);
    let mut tries = 0;
    loop {
        tries += 1;
        match spawn_project_watcher(ctx.clone()) {
            Ok(handle) => return Ok(handle),
            Err(err) if tries < attempts => {
                warn!(
                    project = %ctx.project,
                    attempt = tries,
                    attempts,
                    error = %format!("{err:#}"),
                    "could not start watcher; retrying"
                );
                tokio::time::sleep(pause).await;
            }
            Err(err) => {
                return Err(err.context(format!(
                    "starting watcher for project '{}' failed after {attempts} attempts",
                    ctx.project
                )));
            }
        }
    }
}
