// src/task/naming.rs

//! Task file naming: `<prefix>-<YYYYMMDD>-<HHMMSS>-<kebab-slug>.<ext>`.
//!
//! Matching is two-staged. A compiled glob
//! (`<prefix>-????????-??????-*.<ext>`) is the cheap filter used on watcher
//! events; a strict regex then validates the timestamp digits and the
//! kebab-case slug, and chrono rejects impossible dates.

use std::fmt;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use globset::{Glob, GlobMatcher};
use regex::Regex;

/// Components of a task file name that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFileName {
    /// File stem, used as the task id.
    pub id: String,
    /// Timestamp embedded in the name.
    pub stamp: NaiveDateTime,
    /// Kebab-case description.
    pub slug: String,
}

/// Compiled naming pattern for one prefix/extension pair.
#[derive(Clone)]
pub struct TaskNamePattern {
    prefix: String,
    extension: String,
    glob: GlobMatcher,
    strict: Regex,
}

impl fmt::Debug for TaskNamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskNamePattern")
            .field("glob", &self.glob_pattern())
            .finish_non_exhaustive()
    }
}

impl TaskNamePattern {
    /// Build a pattern. `prefix` and `extension` are expected to be plain
    /// `[A-Za-z0-9_]` words (enforced by config validation).
    pub fn new(prefix: &str, extension: &str) -> Result<Self> {
        let glob_str = format!("{prefix}-????????-??????-*.{extension}");
        let glob = Glob::new(&glob_str)
            .with_context(|| format!("invalid task glob pattern: {glob_str}"))?
            .compile_matcher();

        let strict_str = format!(
            r"^{}-(\d{{8}})-(\d{{6}})-([a-z0-9]+(?:-[a-z0-9]+)*)\.{}$",
            regex::escape(prefix),
            regex::escape(extension)
        );
        let strict = Regex::new(&strict_str)
            .with_context(|| format!("invalid task name regex: {strict_str}"))?;

        Ok(Self {
            prefix: prefix.to_string(),
            extension: extension.to_string(),
            glob,
            strict,
        })
    }

    pub fn glob_pattern(&self) -> String {
        format!("{}-????????-??????-*.{}", self.prefix, self.extension)
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Cheap check used by the watcher before any further work.
    pub fn glob_matches(&self, file_name: &str) -> bool {
        self.glob.is_match(file_name)
    }

    /// Parse a bare file name (no directories). Returns `None` for anything
    /// that is not a well-formed task file name.
    pub fn parse(&self, file_name: &str) -> Option<TaskFileName> {
        if !self.glob_matches(file_name) {
            return None;
        }
        let caps = self.strict.captures(file_name)?;
        let date = caps.get(1)?.as_str();
        let time = caps.get(2)?.as_str();
        let slug = caps.get(3)?.as_str();

        let stamp =
            NaiveDateTime::parse_from_str(&format!("{date}{time}"), "%Y%m%d%H%M%S").ok()?;

        let id = file_name
            .strip_suffix(&format!(".{}", self.extension))?
            .to_string();

        Some(TaskFileName {
            id,
            stamp,
            slug: slug.to_string(),
        })
    }

    /// File name for a task id.
    pub fn file_name_for(&self, id: &str) -> String {
        format!("{id}.{}", self.extension)
    }
}
