// src/exec/backend.rs

//! Pluggable execution engine abstraction.
//!
//! The task executor talks to an `ExecutionEngine` instead of spawning
//! processes itself. Production uses [`SubprocessEngine`](super::command::SubprocessEngine);
//! tests provide a scripted fake that never touches the OS.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use thiserror::Error;

/// Everything an engine needs to perform one task attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub task_id: String,
    pub project: String,
    /// Text body of the task file.
    pub content: String,
    /// Project root; the engine performs the work relative to it.
    pub working_dir: PathBuf,
    pub task_file: PathBuf,
    /// 1-based attempt number.
    pub attempt: u32,
}

/// Structured result returned by an engine that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOutcome {
    pub success: bool,
    pub summary: String,
    pub output: String,
}

impl EngineOutcome {
    pub fn success(summary: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            success: true,
            summary: summary.into(),
            output: output.into(),
        }
    }

    pub fn failure(summary: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            success: false,
            summary: summary.into(),
            output: output.into(),
        }
    }
}

/// The engine could not produce an outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Connection/process level problem; worth another attempt.
    #[error("transient engine failure: {0}")]
    Transient(String),

    /// The engine cannot handle this task; retrying will not help.
    #[error("engine failure: {0}")]
    Durable(String),
}

pub type EngineFuture<'a> =
    Pin<Box<dyn Future<Output = Result<EngineOutcome, EngineError>> + Send + 'a>>;

/// Trait abstracting how a task's content is executed.
///
/// Dropping the returned future must abandon the attempt; the executor
/// relies on this to enforce its timeout.
pub trait ExecutionEngine: Send + Sync {
    fn execute(&self, request: ExecutionRequest) -> EngineFuture<'_>;
}
