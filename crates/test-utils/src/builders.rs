use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use taskmon::config::{ConfigFile, Layout, ProjectEntry, ProjectPaths, RawConfigFile, Registry};
use taskmon::fs::RealFileSystem;
use taskmon::queue::{QueueSnapshot, QueueStateStore};
use taskmon::retry::RetryPolicy;
use taskmon::store::{ResultRecord, ResultStore};

/// Builder for `ConfigFile` with test-friendly defaults: no settle delay,
/// no retry or persistence back-off, a short timeout.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        let mut config = RawConfigFile::default();
        config.executor.command = vec!["fake-engine".to_string()];
        config.executor.timeout = "5s".to_string();
        config.executor.retry_delay = "0ms".to_string();
        config.executor.retry_max_delay = "0ms".to_string();
        config.watch.settle_delay = "0ms".to_string();
        config.watch.start_retries = 1;
        config.daemon.persist_retry_delay = "0ms".to_string();
        config.daemon.persist_retry_max_delay = "0ms".to_string();
        Self { config }
    }

    pub fn command(mut self, command: &[&str]) -> Self {
        self.config.executor.command = command.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn timeout(mut self, timeout: &str) -> Self {
        self.config.executor.timeout = timeout.to_string();
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.executor.max_attempts = n;
        self
    }

    pub fn settle(mut self, delay: &str, checks: u32) -> Self {
        self.config.watch.settle_delay = delay.to_string();
        self.config.watch.settle_checks = checks;
        self
    }

    pub fn duplicate_window(mut self, window: &str) -> Self {
        self.config.watch.duplicate_window = window.to_string();
        self
    }

    pub fn naming(mut self, prefix: &str, extension: &str) -> Self {
        self.config.layout.prefix = prefix.to_string();
        self.config.layout.extension = extension.to_string();
        self
    }

    pub fn raw(&self) -> &RawConfigFile {
        &self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }

    pub fn build_arc(self) -> Arc<ConfigFile> {
        Arc::new(self.build())
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A project root in a temporary directory.
pub struct ProjectFixture {
    pub name: String,
    dir: TempDir,
    layout: Layout,
}

impl ProjectFixture {
    pub fn new(name: &str) -> Self {
        Self::with_layout(name, Layout::default())
    }

    pub fn with_layout(name: &str, layout: Layout) -> Self {
        Self {
            name: name.to_string(),
            dir: tempfile::tempdir().expect("failed to create tempdir"),
            layout,
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn paths(&self) -> ProjectPaths {
        self.layout.project_paths(self.root())
    }

    pub fn entry(&self) -> ProjectEntry {
        ProjectEntry::new(&self.name, self.root(), true)
    }

    pub fn tasks_dir(&self) -> PathBuf {
        let dir = self.paths().tasks;
        fs::create_dir_all(&dir).expect("failed to create tasks dir");
        dir
    }

    /// Write a task file the way producers must: temporary name, then
    /// rename into place.
    pub fn drop_task(&self, file_name: &str, content: &str) -> PathBuf {
        let dir = self.tasks_dir();
        let tmp = dir.join(format!(".{file_name}.tmp"));
        let dest = dir.join(file_name);
        fs::write(&tmp, content).expect("failed to write temp task file");
        fs::rename(&tmp, &dest).expect("failed to rename task file");
        dest
    }

    pub fn results(&self) -> ResultStore {
        ResultStore::new(
            &self.paths().results,
            Arc::new(RealFileSystem),
            RetryPolicy::immediate(),
        )
    }

    pub fn result(&self, task_id: &str) -> Option<ResultRecord> {
        self.results().get(task_id).expect("failed to read result")
    }

    pub fn state_store(&self) -> QueueStateStore {
        QueueStateStore::new(&self.paths().state, Arc::new(RealFileSystem))
    }

    pub fn snapshot(&self) -> Option<QueueSnapshot> {
        self.state_store().load().expect("failed to read queue snapshot")
    }
}

/// Registry with every fixture enabled.
pub fn registry_of(projects: &[&ProjectFixture]) -> Registry {
    Registry::from_entries(projects.iter().map(|p| p.entry()))
}
