// src/config/mod.rs

//! Daemon configuration and the project registry.
//!
//! - `model.rs`: TOML-backed data model and the validated `ConfigFile`.
//! - `loader.rs`: read a config file from disk.
//! - `validate.rs`: `RawConfigFile -> ConfigFile`.
//! - `registry.rs`: the `projects.toml` registry snapshot.

pub mod loader;
pub mod model;
pub mod registry;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    ConfigFile, ExecutorSettings, Layout, ProjectPaths, RawConfigFile, WatchSettings,
};
pub use registry::{ProjectEntry, Registry, load_registry, save_registry};
