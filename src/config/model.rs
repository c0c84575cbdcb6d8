// src/config/model.rs

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::retry::RetryPolicy;

/// Top-level configuration as read from `Taskmon.toml`.
///
/// ```toml
/// [daemon]
/// registry = "projects.toml"
///
/// [layout]
/// tasks_dir = "tasks"
/// prefix = "task"
/// extension = "md"
///
/// [executor]
/// command = ["my-engine", "--run"]
/// timeout = "30m"
/// max_attempts = 3
/// ```
///
/// Every section except `[executor].command` is optional. Durations are
/// strings (`"500ms"`, `"5s"`, `"30m"`) and are parsed during validation,
/// which turns this into a [`ConfigFile`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub daemon: DaemonSection,

    #[serde(default)]
    pub layout: Layout,

    #[serde(default)]
    pub executor: ExecutorSection,

    #[serde(default)]
    pub watch: WatchSection,

    #[serde(default)]
    pub status: StatusSection,
}

/// `[daemon]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonSection {
    /// Project registry file, relative to the config file's directory.
    #[serde(default = "default_registry")]
    pub registry: String,

    /// Optional file that mirrors the daemon log.
    #[serde(default)]
    pub log_file: Option<String>,

    #[serde(default = "default_persist_retry_delay")]
    pub persist_retry_delay: String,

    #[serde(default = "default_persist_retry_max_delay")]
    pub persist_retry_max_delay: String,
}

fn default_registry() -> String {
    "projects.toml".to_string()
}

fn default_persist_retry_delay() -> String {
    "500ms".to_string()
}

fn default_persist_retry_max_delay() -> String {
    "30s".to_string()
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self {
            registry: default_registry(),
            log_file: None,
            persist_retry_delay: default_persist_retry_delay(),
            persist_retry_max_delay: default_persist_retry_max_delay(),
        }
    }
}

/// `[layout]` section: directory names under each project root and the
/// task file naming pattern.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Layout {
    #[serde(default = "default_tasks_dir")]
    pub tasks_dir: String,
    #[serde(default = "default_results_dir")]
    pub results_dir: String,
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
    #[serde(default = "default_logs_dir")]
    pub logs_dir: String,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_extension")]
    pub extension: String,
}

fn default_tasks_dir() -> String {
    "tasks".to_string()
}

fn default_results_dir() -> String {
    "results".to_string()
}

fn default_state_dir() -> String {
    "state".to_string()
}

fn default_logs_dir() -> String {
    "logs".to_string()
}

fn default_prefix() -> String {
    "task".to_string()
}

fn default_extension() -> String {
    "md".to_string()
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            tasks_dir: default_tasks_dir(),
            results_dir: default_results_dir(),
            state_dir: default_state_dir(),
            logs_dir: default_logs_dir(),
            prefix: default_prefix(),
            extension: default_extension(),
        }
    }
}

impl Layout {
    /// Resolve the per-project directories under `root`.
    pub fn project_paths(&self, root: &Path) -> ProjectPaths {
        ProjectPaths {
            root: root.to_path_buf(),
            tasks: root.join(&self.tasks_dir),
            results: root.join(&self.results_dir),
            state: root.join(&self.state_dir),
            logs: root.join(&self.logs_dir),
        }
    }
}

/// Concrete directories of one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    pub root: PathBuf,
    pub tasks: PathBuf,
    pub results: PathBuf,
    pub state: PathBuf,
    pub logs: PathBuf,
}

/// `[executor]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorSection {
    /// Program and arguments of the execution engine.
    #[serde(default)]
    pub command: Vec<String>,

    #[serde(default = "default_timeout")]
    pub timeout: String,

    /// Upper bound on attempts for transient failures (including the first).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_delay")]
    pub retry_delay: String,

    #[serde(default = "default_retry_multiplier")]
    pub retry_multiplier: f64,

    #[serde(default = "default_retry_max_delay")]
    pub retry_max_delay: String,

    /// Exit codes the engine uses to signal a transient failure.
    #[serde(default = "default_transient_exit_codes")]
    pub transient_exit_codes: Vec<i32>,
}

fn default_timeout() -> String {
    "30m".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay() -> String {
    "5s".to_string()
}

fn default_retry_multiplier() -> f64 {
    2.0
}

fn default_retry_max_delay() -> String {
    "5m".to_string()
}

fn default_transient_exit_codes() -> Vec<i32> {
    // EX_TEMPFAIL from sysexits.h
    vec![75]
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            timeout: default_timeout(),
            max_attempts: default_max_attempts(),
            retry_delay: default_retry_delay(),
            retry_multiplier: default_retry_multiplier(),
            retry_max_delay: default_retry_max_delay(),
            transient_exit_codes: default_transient_exit_codes(),
        }
    }
}

/// `[watch]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchSection {
    /// Pause between size checks of a freshly arrived file.
    #[serde(default = "default_settle_delay")]
    pub settle_delay: String,

    /// How many times a growing file is re-checked before enqueuing anyway.
    #[serde(default = "default_settle_checks")]
    pub settle_checks: u32,

    /// Window in which repeated events for the same task id are coalesced.
    #[serde(default = "default_duplicate_window")]
    pub duplicate_window: String,

    /// Attempts to start the filesystem watcher for one project.
    #[serde(default = "default_start_retries")]
    pub start_retries: u32,
}

fn default_settle_delay() -> String {
    "300ms".to_string()
}

fn default_settle_checks() -> u32 {
    5
}

fn default_duplicate_window() -> String {
    "2s".to_string()
}

fn default_start_retries() -> u32 {
    3
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            settle_delay: default_settle_delay(),
            settle_checks: default_settle_checks(),
            duplicate_window: default_duplicate_window(),
            start_retries: default_start_retries(),
        }
    }
}

/// `[status]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusSection {
    /// Number of most recent results shown per project.
    #[serde(default = "default_recent_results")]
    pub recent_results: usize,
}

fn default_recent_results() -> usize {
    10
}

impl Default for StatusSection {
    fn default() -> Self {
        Self {
            recent_results: default_recent_results(),
        }
    }
}

/// Validated daemon settings.
#[derive(Debug, Clone, PartialEq)]
pub struct DaemonSettings {
    /// Registry path as written in the config (may be relative).
    pub registry: PathBuf,
    pub log_file: Option<PathBuf>,
    /// Back-off for failed queue-state/result writes.
    pub persist_retry: RetryPolicy,
}

/// Validated executor settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorSettings {
    pub command: Vec<String>,
    pub timeout: Duration,
    pub max_attempts: u32,
    pub retry: RetryPolicy,
    pub transient_exit_codes: Vec<i32>,
}

/// Validated watcher settings.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchSettings {
    pub settle_delay: Duration,
    pub settle_checks: u32,
    pub duplicate_window: Duration,
    pub start_retries: u32,
}

/// Validated configuration; construct it with `ConfigFile::try_from(raw)`
/// or [`crate::config::load_and_validate`].
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    /// Directory relative paths in the config resolve against.
    pub base_dir: PathBuf,
    pub daemon: DaemonSettings,
    pub layout: Layout,
    pub executor: ExecutorSettings,
    pub watch: WatchSettings,
    pub recent_results: usize,
}

impl ConfigFile {
    /// Absolute (or base-relative) path of the project registry.
    pub fn registry_path(&self) -> PathBuf {
        self.base_dir.join(&self.daemon.registry)
    }

    pub fn log_file_path(&self) -> Option<PathBuf> {
        self.daemon
            .log_file
            .as_ref()
            .map(|p| self.base_dir.join(p))
    }

    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }
}
