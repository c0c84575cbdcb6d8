// src/engine/dispatcher.rs

//! Owns the running projects: their queue, worker loop and watcher.
//!
//! Projects are fully independent. There is no global concurrency cap; each
//! project holds a single concurrency token enforced by its queue.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::{ConfigFile, ProjectEntry, ProjectPaths, Registry, WatchSettings};
use crate::engine::core::{ReconcilePlan, plan_reconcile};
use crate::engine::worker_loop::run_worker_loop;
use crate::engine::LoopState;
use crate::errors::{Result, TaskmonError};
use crate::exec::{ExecutionEngine, TaskExecutor};
use crate::fs::FileSystem;
use crate::queue::{ProjectQueue, QueueStateStore, recover_project};
use crate::store::ResultStore;
use crate::task::TaskNamePattern;
use crate::watch::{WatchContext, WatcherHandle, spawn_with_retries};

const WATCHER_RETRY_PAUSE: Duration = Duration::from_secs(1);

struct ProjectRuntime {
    entry: ProjectEntry,
    paths: ProjectPaths,
    queue: Arc<ProjectQueue>,
    results: ResultStore,
    stop_tx: watch::Sender<bool>,
    state_rx: watch::Receiver<LoopState>,
    worker: JoinHandle<()>,
    watcher: Option<WatcherHandle>,
}

/// What a reconcile pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub started: Vec<String>,
    pub stopped: Vec<String>,
    /// Projects that could not be started, with the reason.
    pub failed: Vec<(String, String)>,
}

/// What it takes to bring one project online once no older loop of it is
/// running.
struct Activation {
    name: String,
    paths: ProjectPaths,
    pattern: TaskNamePattern,
    state: QueueStateStore,
    results: ResultStore,
    queue: Arc<ProjectQueue>,
    fs: Arc<dyn FileSystem>,
    /// `None` when running without watchers.
    watch: Option<WatchSettings>,
}

impl Activation {
    async fn recover(&self) -> Result<()> {
        let (records, report) = recover_project(
            &self.name,
            &self.paths,
            &self.pattern,
            &self.state,
            &self.results,
            self.fs.as_ref(),
        )?;
        self.queue.restore(records).await;
        info!(
            project = %self.name,
            root = %self.paths.root.display(),
            interrupted = ?report.interrupted,
            restored = report.restored,
            discovered = report.discovered,
            "project recovered"
        );
        Ok(())
    }

    async fn start_watcher(&self) -> Result<Option<WatcherHandle>> {
        let Some(settings) = &self.watch else {
            return Ok(None);
        };
        let ctx = WatchContext {
            project: self.name.clone(),
            tasks_dir: self.paths.tasks.clone(),
            pattern: self.pattern.clone(),
            queue: self.queue.clone(),
            results: self.results.clone(),
            fs: self.fs.clone(),
            settings: settings.clone(),
        };
        spawn_with_retries(ctx, settings.start_retries, WATCHER_RETRY_PAUSE)
            .await
            .map(Some)
            .map_err(TaskmonError::Other)
    }
}

/// Wait for the previous loop of a project to drain, then recover the
/// project and run it. The watcher lives until the stop flag is raised.
async fn resume_after_drain(
    previous: JoinHandle<()>,
    activation: Activation,
    executor: TaskExecutor,
    stop_rx: watch::Receiver<bool>,
    state_tx: watch::Sender<LoopState>,
) {
    if let Err(err) = previous.await {
        warn!(project = %activation.name, error = %err, "previous worker loop ended abnormally");
    }
    if *stop_rx.borrow() {
        state_tx.send_replace(LoopState::Stopped);
        return;
    }

    let watcher = match activation.recover().await {
        Ok(()) => activation.start_watcher().await,
        Err(err) => Err(err),
    };
    let watcher = match watcher {
        Ok(watcher) => watcher,
        Err(err) => {
            error!(project = %activation.name, error = %err, "project could not be resumed");
            state_tx.send_replace(LoopState::Stopped);
            return;
        }
    };

    let mut watcher_stop = stop_rx.clone();
    let holder = tokio::spawn(async move {
        // Err means the dispatcher is gone, which also ends the project.
        let _ = watcher_stop.wait_for(|stop| *stop).await;
        drop(watcher);
    });
    run_worker_loop(activation.queue, executor, stop_rx, state_tx).await;
    holder.abort();
}

pub struct Dispatcher {
    config: Arc<ConfigFile>,
    engine: Arc<dyn ExecutionEngine>,
    fs: Arc<dyn FileSystem>,
    pattern: TaskNamePattern,
    watchers_enabled: bool,
    projects: BTreeMap<String, ProjectRuntime>,
    /// Loops of disabled projects that are finishing their current task.
    draining: HashMap<String, JoinHandle<()>>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("projects", &self.projects.keys().collect::<Vec<_>>())
            .field("draining", &self.draining.keys().collect::<Vec<_>>())
            .field("watchers_enabled", &self.watchers_enabled)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(
        config: Arc<ConfigFile>,
        engine: Arc<dyn ExecutionEngine>,
        fs: Arc<dyn FileSystem>,
    ) -> Result<Self> {
        let pattern = TaskNamePattern::new(&config.layout.prefix, &config.layout.extension)
            .map_err(|e| TaskmonError::ConfigError(format!("{e:#}")))?;
        Ok(Self {
            config,
            engine,
            fs,
            pattern,
            watchers_enabled: true,
            projects: BTreeMap::new(),
            draining: HashMap::new(),
        })
    }

    /// Run without filesystem watchers; tasks only arrive through startup
    /// recovery or [`queue`](Self::queue). Used by tests and in-memory setups.
    pub fn without_watchers(mut self) -> Self {
        self.watchers_enabled = false;
        self
    }

    pub fn pattern(&self) -> &TaskNamePattern {
        &self.pattern
    }

    pub fn project_names(&self) -> Vec<String> {
        self.projects.keys().cloned().collect()
    }

    pub fn queue(&self, project: &str) -> Option<Arc<ProjectQueue>> {
        self.projects.get(project).map(|p| p.queue.clone())
    }

    pub fn results(&self, project: &str) -> Option<ResultStore> {
        self.projects.get(project).map(|p| p.results.clone())
    }

    pub fn paths(&self, project: &str) -> Option<&ProjectPaths> {
        self.projects.get(project).map(|p| &p.paths)
    }

    pub fn loop_state(&self, project: &str) -> Option<LoopState> {
        self.projects.get(project).map(|p| p.state_rx.borrow().clone())
    }

    pub fn subscribe_loop_state(&self, project: &str) -> Option<watch::Receiver<LoopState>> {
        self.projects.get(project).map(|p| p.state_rx.clone())
    }

    fn running_roots(&self) -> BTreeMap<String, PathBuf> {
        self.projects
            .iter()
            .map(|(name, p)| (name.clone(), p.entry.root.clone()))
            .collect()
    }

    /// Initial start from a registry snapshot.
    ///
    /// Fails with [`TaskmonError::NoProjectsAvailable`] when the registry has
    /// enabled projects but none of them could be started.
    pub async fn start(&mut self, registry: &Registry) -> Result<ApplyReport> {
        let report = self.reconcile(registry).await;
        let enabled = registry.enabled().count();
        if enabled == 0 {
            warn!("no enabled projects in the registry; waiting for a reload");
        } else if report.started.is_empty() {
            let reasons = report
                .failed
                .iter()
                .map(|(name, why)| format!("{name}: {why}"))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(TaskmonError::NoProjectsAvailable(reasons));
        }
        Ok(report)
    }

    /// Bring running projects in line with `registry`.
    pub async fn reconcile(&mut self, registry: &Registry) -> ApplyReport {
        let plan = plan_reconcile(&self.running_roots(), registry);
        self.apply(plan).await
    }

    pub async fn apply(&mut self, plan: ReconcilePlan) -> ApplyReport {
        let mut report = ApplyReport::default();

        for name in plan.stop {
            if self.stop_project(&name) {
                report.stopped.push(name);
            }
        }

        let mut to_start = plan.restart;
        for entry in &to_start {
            if self.stop_project(&entry.name) {
                report.stopped.push(entry.name.clone());
            }
        }
        to_start.extend(plan.start);

        for entry in to_start {
            match self.start_project(&entry).await {
                Ok(()) => report.started.push(entry.name.clone()),
                Err(err) => {
                    warn!(project = %entry.name, error = %err, "project unavailable; skipping");
                    report.failed.push((entry.name.clone(), err.to_string()));
                }
            }
        }

        report
    }

    /// Start one project: prepare its directories, recover its queue, spawn
    /// its worker loop and (unless disabled) its watcher.
    ///
    /// When an earlier loop of the project is still finishing a task, the
    /// recovery and the new loop run in a background task once that loop has
    /// drained. Other projects are not held up by it.
    pub async fn start_project(&mut self, entry: &ProjectEntry) -> Result<()> {
        if self.projects.contains_key(&entry.name) {
            return Ok(());
        }
        if !self.fs.is_dir(&entry.root) {
            return Err(TaskmonError::ProjectNotFound(format!(
                "{}: root {} does not exist",
                entry.name,
                entry.root.display()
            )));
        }

        let paths = self.config.layout.project_paths(&entry.root);
        for dir in [&paths.tasks, &paths.results, &paths.state, &paths.logs] {
            self.fs.create_dir_all(dir).map_err(|e| {
                TaskmonError::Other(e.context(format!("preparing project '{}'", entry.name)))
            })?;
        }

        let previous = match self.draining.remove(&entry.name) {
            Some(handle) if !handle.is_finished() => Some(handle),
            Some(handle) => {
                if let Err(err) = handle.await {
                    warn!(project = %entry.name, error = %err, "previous worker loop ended abnormally");
                }
                None
            }
            None => None,
        };

        let persist_retry = self.config.daemon.persist_retry;
        let state = QueueStateStore::new(&paths.state, self.fs.clone());
        let results = ResultStore::new(&paths.results, self.fs.clone(), persist_retry);
        let queue = Arc::new(ProjectQueue::new(&entry.name, state.clone(), persist_retry));

        let executor = TaskExecutor::new(
            self.engine.clone(),
            self.config.executor.clone(),
            paths.clone(),
            results.clone(),
            self.fs.clone(),
        );
        let activation = Activation {
            name: entry.name.clone(),
            paths: paths.clone(),
            pattern: self.pattern.clone(),
            state,
            results: results.clone(),
            queue: queue.clone(),
            fs: self.fs.clone(),
            watch: self.watchers_enabled.then(|| self.config.watch.clone()),
        };
        let (stop_tx, stop_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(LoopState::Idle);

        let (worker, watcher) = match previous {
            Some(previous) => {
                info!(project = %entry.name, "previous worker loop still draining; resuming in the background");
                let worker = tokio::spawn(resume_after_drain(
                    previous, activation, executor, stop_rx, state_tx,
                ));
                (worker, None)
            }
            None => {
                activation.recover().await?;
                let worker =
                    tokio::spawn(run_worker_loop(queue.clone(), executor, stop_rx, state_tx));
                match activation.start_watcher().await {
                    Ok(watcher) => (worker, watcher),
                    Err(err) => {
                        stop_tx.send_replace(true);
                        if let Err(join_err) = worker.await {
                            warn!(project = %entry.name, error = %join_err, "worker loop ended abnormally");
                        }
                        return Err(err);
                    }
                }
            }
        };

        self.projects.insert(
            entry.name.clone(),
            ProjectRuntime {
                entry: entry.clone(),
                paths,
                queue,
                results,
                stop_tx,
                state_rx,
                worker,
                watcher,
            },
        );
        Ok(())
    }

    /// Disable a project: stop accepting tasks at once and let the loop
    /// finish its current task in the background. Queued tasks stay in the
    /// persisted snapshot. Returns `false` if the project was not running.
    pub fn stop_project(&mut self, name: &str) -> bool {
        let Some(runtime) = self.projects.remove(name) else {
            return false;
        };
        runtime.queue.close();
        drop(runtime.watcher);
        runtime.stop_tx.send_replace(true);
        self.draining.insert(name.to_string(), runtime.worker);
        info!(project = %name, "project stopped");
        true
    }

    /// Stop every watcher immediately, then wait for each loop to bring its
    /// in-flight task to a terminal state.
    pub async fn shutdown(&mut self) {
        let names: Vec<String> = self.projects.keys().cloned().collect();
        for name in names {
            self.stop_project(&name);
        }

        for (name, handle) in self.draining.drain() {
            if let Err(err) = handle.await {
                warn!(project = %name, error = %err, "worker loop ended abnormally");
            }
        }
        info!("all worker loops stopped");
    }
}
