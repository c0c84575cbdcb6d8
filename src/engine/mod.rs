// src/engine/mod.rs

//! Orchestration engine for taskmon.
//!
//! This module ties together:
//! - one sequential worker loop per enabled project ([`worker_loop`])
//! - the dispatcher that owns those loops and their watchers ([`dispatcher`])
//! - the daemon event loop that reacts to reload and shutdown requests
//!   ([`runtime`])
//!
//! Deciding which projects to start, stop or restart after a registry
//! (re)load is a pure function in [`core`]; the async shell applies it.

/// Events flowing into the daemon runtime from signal handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonEvent {
    /// Re-read the project registry and reconcile running projects.
    ReloadRequested,
    /// Graceful shutdown requested (Ctrl-C, SIGTERM).
    ShutdownRequested,
}

/// Observable state of one project's worker loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running(String),
    Stopped,
}

pub mod core;
pub mod dispatcher;
pub mod runtime;
pub mod worker_loop;

pub use core::{ReconcilePlan, plan_reconcile};
pub use dispatcher::{ApplyReport, Dispatcher};
pub use runtime::Runtime;
pub use worker_loop::run_worker_loop;
