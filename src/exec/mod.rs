// src/exec/mod.rs

//! Task execution layer.
//!
//! - [`backend`] defines the `ExecutionEngine` trait the executor calls.
//! - [`command`] is the production engine: a subprocess fed the task
//!   content on stdin.
//! - [`task_runner`] runs one task record end to end: timeout, retries,
//!   result records and the per-task transcript.

pub mod backend;
pub mod command;
pub mod task_runner;

pub use backend::{EngineError, EngineFuture, EngineOutcome, ExecutionEngine, ExecutionRequest};
pub use command::SubprocessEngine;
pub use task_runner::TaskExecutor;
