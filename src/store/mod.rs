// src/store/mod.rs

pub mod results;

pub use results::{ResultRecord, ResultStore, TaskFailure};
