// src/config/registry.rs

//! Project registry (`projects.toml`).
//!
//! ```toml
//! [project.alpha]
//! path = "/srv/alpha"
//! enabled = true
//! ```
//!
//! A loaded [`Registry`] is an immutable snapshot. Reloading produces a new
//! snapshot which the dispatcher reconciles against the running projects.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{Result, TaskmonError};
use crate::fs::FileSystem;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawRegistry {
    #[serde(default)]
    project: BTreeMap<String, RawProjectEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawProjectEntry {
    path: String,
    #[serde(default = "default_enabled")]
    enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// One registered project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectEntry {
    pub name: String,
    pub root: PathBuf,
    pub enabled: bool,
}

impl ProjectEntry {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            enabled,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    projects: BTreeMap<String, ProjectEntry>,
}

/// Project names are used as directory-free keys in logs and status output.
pub fn is_valid_project_name(name: &str) -> bool {
    !name.trim().is_empty()
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains("..")
        && !name.chars().any(char::is_control)
}

impl Registry {
    pub fn from_entries(entries: impl IntoIterator<Item = ProjectEntry>) -> Self {
        Self {
            projects: entries
                .into_iter()
                .map(|e| (e.name.clone(), e))
                .collect(),
        }
    }

    /// Parse registry TOML. Relative paths resolve against `base_dir`.
    pub fn parse(contents: &str, base_dir: &Path) -> Result<Self> {
        let raw: RawRegistry = toml::from_str(contents)
            .map_err(|e| TaskmonError::RegistryError(e.to_string()))?;

        let mut projects = BTreeMap::new();
        for (name, entry) in raw.project {
            if !is_valid_project_name(&name) {
                warn!(project = %name, "skipping registry entry with invalid name");
                continue;
            }
            if entry.path.trim().is_empty() {
                warn!(project = %name, "skipping registry entry with empty path");
                continue;
            }
            let path = PathBuf::from(&entry.path);
            let root = if path.is_absolute() {
                path
            } else {
                base_dir.join(path)
            };
            projects.insert(
                name.clone(),
                ProjectEntry {
                    name,
                    root: normalize(&root),
                    enabled: entry.enabled,
                },
            );
        }
        Ok(Self { projects })
    }

    pub fn to_toml(&self) -> Result<String> {
        let raw = RawRegistry {
            project: self
                .projects
                .values()
                .map(|e| {
                    (
                        e.name.clone(),
                        RawProjectEntry {
                            path: e.root.to_string_lossy().into_owned(),
                            enabled: e.enabled,
                        },
                    )
                })
                .collect(),
        };
        toml::to_string_pretty(&raw).map_err(|e| TaskmonError::RegistryError(e.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&ProjectEntry> {
        self.projects.get(name)
    }

    /// All entries, ordered by name.
    pub fn iter(&self) -> impl Iterator<Item = &ProjectEntry> {
        self.projects.values()
    }

    pub fn enabled(&self) -> impl Iterator<Item = &ProjectEntry> {
        self.projects.values().filter(|e| e.enabled)
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    /// New snapshot with `entry` added or replaced.
    pub fn with_entry(&self, entry: ProjectEntry) -> Self {
        let mut projects = self.projects.clone();
        projects.insert(entry.name.clone(), entry);
        Self { projects }
    }
}

/// Lexically drop `.` components and fold `..` where possible.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn registry_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Read and parse the registry at `path`.
pub fn load_registry(fs: &dyn FileSystem, path: &Path) -> Result<Registry> {
    let contents = fs.read_to_string(path).map_err(|e| {
        TaskmonError::RegistryError(format!("cannot read {}: {e:#}", path.display()))
    })?;
    Registry::parse(&contents, &registry_dir(path))
}

/// Like [`load_registry`], but a missing file is an empty registry.
pub fn load_registry_or_default(fs: &dyn FileSystem, path: &Path) -> Result<Registry> {
    if !fs.exists(path) {
        return Ok(Registry::default());
    }
    load_registry(fs, path)
}

/// Atomically replace the registry file.
pub fn save_registry(fs: &dyn FileSystem, path: &Path, registry: &Registry) -> Result<()> {
    let contents = registry.to_toml()?;
    fs.write_atomic(path, contents.as_bytes())?;
    Ok(())
}
