// src/watch/event_handler.rs

//! Turns filesystem events in a project's tasks directory into enqueued
//! task records.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use notify::EventKind;
use notify::event::{ModifyKind, RenameMode};
use tracing::{debug, info, warn};

use crate::config::WatchSettings;
use crate::fs::FileSystem;
use crate::queue::ProjectQueue;
use crate::store::ResultStore;
use crate::task::{TaskNamePattern, TaskRecord};
use crate::watch::dedup::RecentEvents;
use crate::watch::settle::wait_until_stable;

/// Everything the watcher needs to accept tasks for one project.
#[derive(Debug, Clone)]
pub struct WatchContext {
    pub project: String,
    pub tasks_dir: PathBuf,
    pub pattern: TaskNamePattern,
    pub queue: Arc<ProjectQueue>,
    pub results: ResultStore,
    pub fs: Arc<dyn FileSystem>,
    pub settings: WatchSettings,
}

/// What happened to one candidate path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arrival {
    Enqueued(String),
    /// Name does not match the task pattern.
    NotATaskFile,
    /// Another event for the same id arrived within the duplicate window.
    Duplicate(String),
    /// The file disappeared before it could be accepted.
    Vanished(String),
    Unreadable(String),
    /// A result for this id already exists.
    AlreadyRecorded(String),
    AlreadyQueued(String),
    /// The project was disabled before the task could be queued.
    Rejected(String),
}

/// Creations and renames into the directory; everything else is noise.
pub fn is_arrival(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_)
            | EventKind::Modify(ModifyKind::Name(
                RenameMode::To | RenameMode::Both | RenameMode::Any
            ))
    )
}

/// Validate one path and enqueue it if it is a new task.
pub async fn process_task_path(ctx: &WatchContext, path: &Path, recent: &mut RecentEvents) -> Arrival {
    let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
        return Arrival::NotATaskFile;
    };
    let Some(name) = ctx.pattern.parse(file_name) else {
        if ctx.pattern.glob_matches(file_name) {
            warn!(
                project = %ctx.project,
                file = %file_name,
                "ignoring malformed task file name (bad timestamp or slug)"
            );
        } else {
            debug!(project = %ctx.project, file = %file_name, "ignoring file outside the task naming pattern");
        }
        return Arrival::NotATaskFile;
    };

    if !recent.observe(&name.id, Instant::now()) {
        debug!(project = %ctx.project, task = %name.id, "coalescing duplicate event");
        return Arrival::Duplicate(name.id);
    }

    if !ctx.fs.is_file(path) {
        debug!(project = %ctx.project, task = %name.id, "task file vanished before it was accepted");
        return Arrival::Vanished(name.id);
    }

    if let Err(err) = wait_until_stable(
        ctx.fs.as_ref(),
        path,
        ctx.settings.settle_delay,
        ctx.settings.settle_checks,
    )
    .await
    {
        debug!(project = %ctx.project, task = %name.id, error = %err, "task file vanished while settling");
        return Arrival::Vanished(name.id);
    }

    if let Err(err) = ctx.fs.read_to_string(path) {
        warn!(
            project = %ctx.project,
            task = %name.id,
            error = %format!("{err:#}"),
            "dropping unreadable task file"
        );
        return Arrival::Unreadable(name.id);
    }

    if ctx.results.contains(&name.id) {
        debug!(project = %ctx.project, task = %name.id, "task already has a result; not enqueuing");
        return Arrival::AlreadyRecorded(name.id);
    }

    let record = TaskRecord::queued(&ctx.project, &name, path, Utc::now());
    if ctx.queue.enqueue(record).await {
        info!(project = %ctx.project, task = %name.id, "new task detected");
        Arrival::Enqueued(name.id)
    } else if ctx.queue.is_closed() {
        debug!(project = %ctx.project, task = %name.id, "project disabled; task not queued");
        Arrival::Rejected(name.id)
    } else {
        Arrival::AlreadyQueued(name.id)
    }
}

/// Offer every file currently in the tasks directory, oldest name first.
///
/// Run once right after the watcher is registered so files that landed
/// between startup recovery and the watch are not missed.
pub async fn sweep_tasks_dir(ctx: &WatchContext, recent: &mut RecentEvents) -> Vec<Arrival> {
    let mut paths = match ctx.fs.read_dir(&ctx.tasks_dir) {
        Ok(paths) => paths,
        Err(err) => {
            warn!(project = %ctx.project, error = %format!("{err:#}"), "could not list tasks directory");
            return Vec::new();
        }
    };
    paths.sort();

    let mut arrivals = Vec::with_capacity(paths.len());
    for path in paths {
        arrivals.push(process_task_path(ctx, &path, recent).await);
    }
    arrivals
}
