// src/watch/mod.rs

//! Directory watching.
//!
//! One `notify` watcher per enabled project observes the project's tasks
//! directory. Qualifying arrivals (names matching the task pattern, settled,
//! not yet queued or recorded) become `Queued` task records on that
//! project's queue. The watcher knows nothing about execution.

pub mod dedup;
pub mod event_handler;
pub mod settle;
pub mod watcher;

pub use event_handler::{Arrival, WatchContext, process_task_path, sweep_tasks_dir};
pub use watcher::{WatcherHandle, spawn_project_watcher, spawn_with_retries};
