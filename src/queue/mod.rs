// src/queue/mod.rs

//! Per-project FIFO queue, its durable snapshot and startup recovery.

pub mod project_queue;
pub mod recovery;
pub mod state_store;

pub use project_queue::ProjectQueue;
pub use recovery::{RecoveryReport, recover_project};
pub use state_store::{QueueSnapshot, QueueStateStore, SNAPSHOT_FILE};
