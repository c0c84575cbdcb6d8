// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `taskmon`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "taskmon",
    version,
    about = "Watch project directories for task files and run them in order, one project at a time.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Taskmon.toml` in the current working directory.
    #[arg(long, global = true, value_name = "PATH", default_value = "Taskmon.toml")]
    pub config: PathBuf,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TASKMON_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run the monitor until interrupted. SIGHUP reloads the project registry.
    Daemon,

    /// Show queue size, running task and waiting tasks.
    Queue {
        /// Only this project (default: every enabled project).
        #[arg(long, value_name = "NAME")]
        project: Option<String>,
    },

    /// Show one task's latest state, or list every recorded result.
    Status {
        /// Task id (file name without extension).
        task_id: Option<String>,

        #[arg(long, value_name = "NAME")]
        project: Option<String>,
    },

    /// List registered projects.
    Projects,

    /// Add or replace a project in the registry.
    Register {
        name: String,
        path: PathBuf,

        /// Register the project as disabled.
        #[arg(long)]
        disabled: bool,
    },
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_flags_work_after_subcommand() {
        let args = CliArgs::try_parse_from([
            "taskmon",
            "queue",
            "--project",
            "alpha",
            "--config",
            "/etc/taskmon/Taskmon.toml",
        ])
        .unwrap();
        assert_eq!(args.config, PathBuf::from("/etc/taskmon/Taskmon.toml"));
        assert!(matches!(args.command, Command::Queue { project: Some(ref p) } if p == "alpha"));
    }

    #[test]
    fn status_without_id_lists_results() {
        let args = CliArgs::try_parse_from(["taskmon", "status"]).unwrap();
        assert!(matches!(
            args.command,
            Command::Status {
                task_id: None,
                project: None
            }
        ));
    }

    #[test]
    fn register_defaults_to_enabled() {
        let args = CliArgs::try_parse_from(["taskmon", "register", "alpha", "/srv/alpha"]).unwrap();
        match args.command {
            Command::Register { name, disabled, .. } => {
                assert_eq!(name, "alpha");
                assert!(!disabled);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
