// src/task/mod.rs

//! Task records and task file naming.

pub mod naming;
pub mod record;

pub use naming::{TaskFileName, TaskNamePattern};
pub use record::{ResultSummary, TaskRecord};
