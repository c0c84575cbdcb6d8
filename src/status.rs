// src/status.rs

//! Read-only status queries over the persisted daemon state, plus the
//! plain-text reports printed by the CLI.
//!
//! Everything here reads the queue snapshot and result files from disk, so
//! it reflects the last durably persisted state and works whether or not a
//! daemon is running.

use std::fmt::Write as _;
use std::sync::Arc;

use crate::config::{Layout, ProjectEntry, Registry};
use crate::errors::{Result, TaskmonError};
use crate::fs::FileSystem;
use crate::queue::{QueueSnapshot, QueueStateStore};
use crate::retry::RetryPolicy;
use crate::store::{ResultRecord, ResultStore};

/// Queue and recent history of one project.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectStatus {
    pub name: String,
    pub enabled: bool,
    pub snapshot: QueueSnapshot,
    pub recent: Vec<ResultRecord>,
}

/// Latest known state of one task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskLookup {
    /// Currently executing; `last_attempt` is set when an earlier attempt
    /// already wrote a result.
    Running { last_attempt: Option<ResultRecord> },
    /// Waiting at 1-based `position`.
    Queued { position: usize },
    Recorded(ResultRecord),
}

#[derive(Debug, Clone)]
pub struct StatusQuery {
    layout: Layout,
    registry: Registry,
    fs: Arc<dyn FileSystem>,
}

impl StatusQuery {
    pub fn new(layout: Layout, registry: Registry, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            layout,
            registry,
            fs,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The named project, or every enabled project when `name` is `None`.
    pub fn select(&self, name: Option<&str>) -> Result<Vec<&ProjectEntry>> {
        match name {
            Some(name) => self
                .registry
                .get(name)
                .map(|e| vec![e])
                .ok_or_else(|| TaskmonError::ProjectNotFound(name.to_string())),
            None => Ok(self.registry.enabled().collect()),
        }
    }

    fn stores(&self, entry: &ProjectEntry) -> (QueueStateStore, ResultStore) {
        let paths = self.layout.project_paths(&entry.root);
        (
            QueueStateStore::new(&paths.state, self.fs.clone()),
            ResultStore::new(&paths.results, self.fs.clone(), RetryPolicy::default()),
        )
    }

    /// Snapshot plus the `recent` most recent results of one project.
    ///
    /// A missing snapshot is an error: the daemon has never persisted state
    /// for this project, so there is nothing trustworthy to report.
    pub fn project(&self, name: &str, recent: usize) -> Result<ProjectStatus> {
        let entry = self
            .registry
            .get(name)
            .ok_or_else(|| TaskmonError::ProjectNotFound(name.to_string()))?;
        let (state, results) = self.stores(entry);

        let snapshot = state.load()?.ok_or_else(|| {
            TaskmonError::ConfigError(format!(
                "no queue state for project '{name}' at {}",
                state.path().display()
            ))
        })?;

        Ok(ProjectStatus {
            name: entry.name.clone(),
            enabled: entry.enabled,
            snapshot,
            recent: results.recent(recent)?,
        })
    }

    /// Look a task id up in the given project, or in every registered
    /// project. `Ok(None)` means unknown, which is not an error.
    pub fn task(&self, id: &str, project: Option<&str>) -> Result<Option<(String, TaskLookup)>> {
        let entries: Vec<&ProjectEntry> = match project {
            Some(_) => self.select(project)?,
            None => self.registry.iter().collect(),
        };

        for entry in entries {
            let (state, results) = self.stores(entry);
            // An unreadable snapshot should not hide a recorded result.
            let snapshot = state.load().ok().flatten();

            if let Some(snap) = &snapshot {
                if snap.current_id.as_deref() == Some(id) {
                    let last_attempt = results.get(id)?;
                    return Ok(Some((entry.name.clone(), TaskLookup::Running { last_attempt })));
                }
                if let Some(position) = snap.position_of(id) {
                    return Ok(Some((entry.name.clone(), TaskLookup::Queued { position })));
                }
            }
            if let Some(record) = results.get(id)? {
                return Ok(Some((entry.name.clone(), TaskLookup::Recorded(record))));
            }
        }
        Ok(None)
    }

    /// Every recorded result of the selected projects, newest first.
    pub fn results(&self, project: Option<&str>) -> Result<Vec<ResultRecord>> {
        let mut all = Vec::new();
        for entry in self.select(project)? {
            let (_, results) = self.stores(entry);
            all.extend(results.all()?);
        }
        all.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        Ok(all)
    }
}

pub fn render_project_status(status: &ProjectStatus) -> String {
    let snap = &status.snapshot;
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Project: {}{}",
        status.name,
        if status.enabled { "" } else { " (disabled)" }
    );
    let _ = writeln!(out, "Queue size: {}", snap.pending_ids.len());
    let _ = writeln!(
        out,
        "Current task: {}",
        snap.current_id.as_deref().unwrap_or("none")
    );
    if !snap.pending_ids.is_empty() {
        let _ = writeln!(out, "Waiting:");
        for (i, id) in snap.pending_ids.iter().enumerate() {
            let _ = writeln!(out, "  {}. {id}", i + 1);
        }
    }
    let _ = writeln!(out, "Updated: {}", snap.updated_at.to_rfc3339());
    if !status.recent.is_empty() {
        let _ = writeln!(out, "Recent results:");
        for r in &status.recent {
            let _ = writeln!(
                out,
                "  {} {} ({:.1}s) {}",
                r.task_id, r.status, r.duration_seconds, r.summary
            );
        }
    }
    out
}

pub fn render_task_lookup(id: &str, project: &str, lookup: &TaskLookup) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Task: {id}");
    let _ = writeln!(out, "Project: {project}");
    match lookup {
        TaskLookup::Running { last_attempt } => {
            let _ = writeln!(out, "Status: running");
            if let Some(r) = last_attempt {
                let _ = writeln!(out, "Previous attempt: {} ({})", r.attempt, r.status);
            }
        }
        TaskLookup::Queued { position } => {
            let _ = writeln!(out, "Status: queued (position {position})");
        }
        TaskLookup::Recorded(r) => {
            let _ = writeln!(out, "Status: {}", r.status);
            let _ = writeln!(out, "Attempt: {}", r.attempt);
            let _ = writeln!(out, "Started: {}", r.started_at.to_rfc3339());
            let _ = writeln!(out, "Completed: {}", r.completed_at.to_rfc3339());
            let _ = writeln!(out, "Duration: {:.1}s", r.duration_seconds);
            let _ = writeln!(out, "Summary: {}", r.summary);
            if let Some(err) = &r.error {
                let _ = writeln!(out, "Error: {} ({})", err.message, err.kind);
            }
            if !r.output.is_empty() {
                let _ = writeln!(out, "Output:\n{}", r.output.trim_end());
            }
        }
    }
    out
}

/// One `<id>: <status>` line per result.
pub fn render_result_listing(results: &[ResultRecord]) -> String {
    let mut out = String::new();
    for r in results {
        let _ = writeln!(out, "{}: {}", r.task_id, r.status);
    }
    out
}

pub fn render_projects(registry: &Registry) -> String {
    let mut out = String::new();
    for e in registry.iter() {
        let _ = writeln!(
            out,
            "{}\t{}\t{}",
            e.name,
            if e.enabled { "enabled" } else { "disabled" },
            e.root.display()
        );
    }
    out
}
