// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod queue;
pub mod retry;
pub mod status;
pub mod store;
pub mod task;
pub mod types;
pub mod watch;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::cli::{CliArgs, Command};
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::config::registry::{
    ProjectEntry, is_valid_project_name, load_registry, load_registry_or_default, save_registry,
};
use crate::engine::{DaemonEvent, Dispatcher, Runtime};
use crate::exec::SubprocessEngine;
use crate::fs::{FileSystem, RealFileSystem};
use crate::status::{
    StatusQuery, render_project_status, render_projects, render_result_listing,
    render_task_lookup,
};

/// High-level entry point used by `main.rs`.
///
/// Returns the process exit code; `Err` is reserved for failures that stop
/// the command from doing anything at all (bad config, unreadable registry,
/// no project could be started).
pub async fn run(args: CliArgs) -> Result<ExitCode> {
    match args.command.clone() {
        Command::Daemon => run_daemon(&args).await,
        Command::Queue { project } => {
            logging::init_logging(args.log_level, None)?;
            let config = load_and_validate(&args.config)?;
            show_queue(&config, project.as_deref())
        }
        Command::Status { task_id, project } => {
            logging::init_logging(args.log_level, None)?;
            let config = load_and_validate(&args.config)?;
            show_status(&config, task_id.as_deref(), project.as_deref())
        }
        Command::Projects => {
            logging::init_logging(args.log_level, None)?;
            let config = load_and_validate(&args.config)?;
            let query = status_query(&config)?;
            if query.registry().is_empty() {
                println!("No projects registered.");
            } else {
                print!("{}", render_projects(query.registry()));
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Register {
            name,
            path,
            disabled,
        } => {
            logging::init_logging(args.log_level, None)?;
            let config = load_and_validate(&args.config)?;
            register_project(&config, &name, &path, !disabled)
        }
    }
}

/// Wire config, registry, engine and dispatcher together and run until a
/// shutdown signal arrives.
async fn run_daemon(args: &CliArgs) -> Result<ExitCode> {
    let config = load_and_validate(&args.config)?;
    let _log_guard = logging::init_logging(args.log_level, config.log_file_path().as_deref())?;

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let registry_path = config.registry_path();
    let registry = load_registry(fs.as_ref(), &registry_path)?;
    info!(
        registry = %registry_path.display(),
        projects = registry.len(),
        "registry loaded"
    );

    let engine = Arc::new(SubprocessEngine::new(
        config.executor.command.clone(),
        config.executor.transient_exit_codes.clone(),
    ));
    let config = Arc::new(config);
    let dispatcher = Dispatcher::new(config, engine, fs.clone())?;

    // Runtime event channel.
    let (tx, rx) = mpsc::channel::<DaemonEvent>(16);
    spawn_signal_handlers(tx);

    let runtime = Runtime::new(dispatcher, registry, registry_path, fs, rx);
    runtime.run().await?;
    Ok(ExitCode::SUCCESS)
}

/// Ctrl-C / SIGTERM → graceful shutdown; SIGHUP → registry reload.
fn spawn_signal_handlers(tx: mpsc::Sender<DaemonEvent>) {
    {
        let tx = tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            let _ = tx.send(DaemonEvent::ShutdownRequested).await;
        });
    }

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                let tx = tx.clone();
                tokio::spawn(async move {
                    if sigterm.recv().await.is_some() {
                        let _ = tx.send(DaemonEvent::ShutdownRequested).await;
                    }
                });
            }
            Err(e) => warn!(error = %e, "failed to listen for SIGTERM"),
        }

        match signal(SignalKind::hangup()) {
            Ok(mut sighup) => {
                tokio::spawn(async move {
                    while sighup.recv().await.is_some() {
                        if tx.send(DaemonEvent::ReloadRequested).await.is_err() {
                            break;
                        }
                    }
                });
            }
            Err(e) => warn!(error = %e, "failed to listen for SIGHUP"),
        }
    }
}

fn status_query(config: &ConfigFile) -> Result<StatusQuery> {
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let registry = load_registry(fs.as_ref(), &config.registry_path())?;
    Ok(StatusQuery::new(config.layout.clone(), registry, fs))
}

fn show_queue(config: &ConfigFile, project: Option<&str>) -> Result<ExitCode> {
    let query = status_query(config)?;
    let entries = match query.select(project) {
        Ok(entries) => entries,
        Err(err) => {
            eprintln!("{err}");
            return Ok(ExitCode::FAILURE);
        }
    };
    if entries.is_empty() {
        println!("No enabled projects.");
        return Ok(ExitCode::SUCCESS);
    }

    let mut ok = true;
    for (i, entry) in entries.iter().enumerate() {
        match query.project(&entry.name, config.recent_results) {
            Ok(status) => {
                if i > 0 {
                    println!();
                }
                print!("{}", render_project_status(&status));
            }
            Err(err) => {
                eprintln!("{}: {err}", entry.name);
                ok = false;
            }
        }
    }
    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn show_status(config: &ConfigFile, task_id: Option<&str>, project: Option<&str>) -> Result<ExitCode> {
    let query = status_query(config)?;

    let Some(id) = task_id else {
        let results = match query.results(project) {
            Ok(results) => results,
            Err(err) => {
                eprintln!("{err}");
                return Ok(ExitCode::FAILURE);
            }
        };
        if results.is_empty() {
            println!("No results.");
        } else {
            print!("{}", render_result_listing(&results));
        }
        return Ok(ExitCode::SUCCESS);
    };

    match query.task(id, project) {
        Ok(Some((project, lookup))) => {
            print!("{}", render_task_lookup(id, &project, &lookup));
            Ok(ExitCode::SUCCESS)
        }
        Ok(None) => {
            eprintln!("Task not found: {id}");
            Ok(ExitCode::FAILURE)
        }
        Err(err) => {
            eprintln!("{err}");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn register_project(config: &ConfigFile, name: &str, path: &Path, enabled: bool) -> Result<ExitCode> {
    if !is_valid_project_name(name) {
        eprintln!("invalid project name: {name:?}");
        return Ok(ExitCode::FAILURE);
    }
    let root = std::path::absolute(path)
        .with_context(|| format!("resolving project path {}", path.display()))?;
    if !root.is_dir() {
        warn!(project = %name, root = %root.display(), "project root does not exist yet");
    }

    let fs = RealFileSystem;
    let registry_path = config.registry_path();
    let registry = load_registry_or_default(&fs, &registry_path)?;
    let updated = registry.with_entry(ProjectEntry::new(name, &root, enabled));
    save_registry(&fs, &registry_path, &updated)?;

    println!(
        "Registered {name} -> {}{}",
        root.display(),
        if enabled { "" } else { " (disabled)" }
    );
    Ok(ExitCode::SUCCESS)
}
