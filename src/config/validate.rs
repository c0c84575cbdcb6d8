// src/config/validate.rs

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::model::{
    ConfigFile, DaemonSettings, ExecutorSettings, Layout, RawConfigFile, WatchSettings,
};
use crate::errors::{Result, TaskmonError};
use crate::retry::RetryPolicy;
use crate::types::parse_duration;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::TaskmonError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_layout(&raw.layout)?;
        let executor = validate_executor(&raw)?;
        let watch = validate_watch(&raw)?;
        let daemon = validate_daemon(&raw)?;

        Ok(ConfigFile {
            base_dir: PathBuf::from("."),
            daemon,
            layout: raw.layout,
            executor,
            watch,
            recent_results: raw.status.recent_results,
        })
    }
}

fn config_error(msg: impl Into<String>) -> TaskmonError {
    TaskmonError::ConfigError(msg.into())
}

fn duration_field(section: &str, key: &str, value: &str) -> Result<Duration> {
    parse_duration(value).map_err(|e| config_error(format!("[{section}].{key}: {e}")))
}

fn validate_layout(layout: &Layout) -> Result<()> {
    for (key, value) in [("prefix", &layout.prefix), ("extension", &layout.extension)] {
        if value.is_empty() || !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(config_error(format!(
                "[layout].{key} must be a non-empty word of [A-Za-z0-9_] (got {value:?})"
            )));
        }
    }

    let dirs = [
        ("tasks_dir", &layout.tasks_dir),
        ("results_dir", &layout.results_dir),
        ("state_dir", &layout.state_dir),
        ("logs_dir", &layout.logs_dir),
    ];
    let mut seen = HashSet::new();
    for (key, value) in dirs {
        if value.trim().is_empty()
            || value.contains('/')
            || value.contains('\\')
            || value == "."
            || value == ".."
        {
            return Err(config_error(format!(
                "[layout].{key} must be a single directory name (got {value:?})"
            )));
        }
        if !seen.insert(value.as_str()) {
            return Err(config_error(format!(
                "[layout].{key} reuses directory name {value:?}"
            )));
        }
    }
    Ok(())
}

fn validate_executor(raw: &RawConfigFile) -> Result<ExecutorSettings> {
    let exec = &raw.executor;
    if exec.command.is_empty() || exec.command[0].trim().is_empty() {
        return Err(config_error(
            "[executor].command must name the engine program (e.g. [\"my-engine\"])",
        ));
    }
    if exec.max_attempts == 0 {
        return Err(config_error("[executor].max_attempts must be >= 1 (got 0)"));
    }
    if !(exec.retry_multiplier >= 1.0) {
        return Err(config_error(format!(
            "[executor].retry_multiplier must be >= 1.0 (got {})",
            exec.retry_multiplier
        )));
    }

    let timeout = duration_field("executor", "timeout", &exec.timeout)?;
    if timeout.is_zero() {
        return Err(config_error("[executor].timeout must be greater than zero"));
    }
    let retry_delay = duration_field("executor", "retry_delay", &exec.retry_delay)?;
    let retry_max_delay = duration_field("executor", "retry_max_delay", &exec.retry_max_delay)?;

    Ok(ExecutorSettings {
        command: exec.command.clone(),
        timeout,
        max_attempts: exec.max_attempts,
        retry: RetryPolicy::new(retry_delay, exec.retry_multiplier, retry_max_delay),
        transient_exit_codes: exec.transient_exit_codes.clone(),
    })
}

fn validate_watch(raw: &RawConfigFile) -> Result<WatchSettings> {
    let watch = &raw.watch;
    Ok(WatchSettings {
        settle_delay: duration_field("watch", "settle_delay", &watch.settle_delay)?,
        settle_checks: watch.settle_checks,
        duplicate_window: duration_field("watch", "duplicate_window", &watch.duplicate_window)?,
        start_retries: watch.start_retries.max(1),
    })
}

fn validate_daemon(raw: &RawConfigFile) -> Result<DaemonSettings> {
    let daemon = &raw.daemon;
    if daemon.registry.trim().is_empty() {
        return Err(config_error("[daemon].registry must not be empty"));
    }
    let base = duration_field("daemon", "persist_retry_delay", &daemon.persist_retry_delay)?;
    let max = duration_field(
        "daemon",
        "persist_retry_max_delay",
        &daemon.persist_retry_max_delay,
    )?;
    Ok(DaemonSettings {
        registry: PathBuf::from(&daemon.registry),
        log_file: daemon.log_file.as_ref().map(PathBuf::from),
        persist_retry: RetryPolicy::new(base, 2.0, max),
    })
}
