// src/engine/core.rs

//! Pure registry reconciliation.
//!
//! Given which projects are running (and from which root) and a freshly
//! loaded registry snapshot, compute what the dispatcher has to do. No
//! Tokio, channels or filesystem access happen here.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::config::{ProjectEntry, Registry};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// Enabled in the registry but not running.
    pub start: Vec<ProjectEntry>,
    /// Running but disabled or removed from the registry.
    pub stop: Vec<String>,
    /// Running and still enabled, but registered under a different root.
    pub restart: Vec<ProjectEntry>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.start.is_empty() && self.stop.is_empty() && self.restart.is_empty()
    }
}

pub fn plan_reconcile(running: &BTreeMap<String, PathBuf>, registry: &Registry) -> ReconcilePlan {
    let mut plan = ReconcilePlan::default();

    for (name, root) in running {
        match registry.get(name) {
            Some(entry) if entry.enabled => {
                if &entry.root != root {
                    plan.restart.push(entry.clone());
                }
            }
            _ => plan.stop.push(name.clone()),
        }
    }

    for entry in registry.enabled() {
        if !running.contains_key(&entry.name) {
            plan.start.push(entry.clone());
        }
    }

    plan
}
