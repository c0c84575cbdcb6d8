// src/task/record.rs

use std::path::PathBuf;

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::errors::{Result, TaskmonError};
use crate::task::naming::TaskFileName;
use crate::types::TaskStatus;

/// Short outcome text plus captured engine output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultSummary {
    pub summary: String,
    pub output: String,
}

/// The daemon's view of one unit of work derived from a watched file.
///
/// Status only moves `Queued -> Running -> {Completed, Failed}`; every
/// mutator checks this and returns [`TaskmonError::InvalidTransition`]
/// otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRecord {
    pub id: String,
    /// Name of the owning project.
    pub project: String,
    pub source_path: PathBuf,
    /// Timestamp embedded in the file name.
    pub stamp: NaiveDateTime,
    status: TaskStatus,
    pub created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    pub attempt: u32,
    result: Option<ResultSummary>,
}

impl TaskRecord {
    pub fn queued(
        project: impl Into<String>,
        name: &TaskFileName,
        source_path: impl Into<PathBuf>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: name.id.clone(),
            project: project.into(),
            source_path: source_path.into(),
            stamp: name.stamp,
            status: TaskStatus::Queued,
            created_at,
            started_at: None,
            completed_at: None,
            attempt: 0,
            result: None,
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn result(&self) -> Option<&ResultSummary> {
        self.result.as_ref()
    }

    /// `Queued -> Running`.
    pub fn start(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.transition(TaskStatus::Running)?;
        self.started_at = Some(at);
        Ok(())
    }

    /// `Running -> Completed`.
    pub fn complete(&mut self, at: DateTime<Utc>, result: ResultSummary) -> Result<()> {
        self.finish(TaskStatus::Completed, at, result)
    }

    /// `Running -> Failed`.
    pub fn fail(&mut self, at: DateTime<Utc>, result: ResultSummary) -> Result<()> {
        self.finish(TaskStatus::Failed, at, result)
    }

    fn finish(
        &mut self,
        status: TaskStatus,
        at: DateTime<Utc>,
        result: ResultSummary,
    ) -> Result<()> {
        self.transition(status)?;
        self.completed_at = Some(at);
        self.result = Some(result);
        Ok(())
    }

    fn transition(&mut self, next: TaskStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(TaskmonError::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::naming::TaskNamePattern;

    fn record() -> TaskRecord {
        let name = TaskNamePattern::new("task", "md")
            .unwrap()
            .parse("task-20260101-100000-a.md")
            .unwrap();
        TaskRecord::queued("alpha", &name, "/p/tasks/task-20260101-100000-a.md", Utc::now())
    }

    fn summary() -> ResultSummary {
        ResultSummary {
            summary: "ok".into(),
            output: String::new(),
        }
    }

    #[test]
    fn running_record_has_started_at() {
        let mut r = record();
        assert_eq!(r.status(), TaskStatus::Queued);
        assert!(r.started_at().is_none());

        r.start(Utc::now()).unwrap();
        assert_eq!(r.status(), TaskStatus::Running);
        assert!(r.started_at().is_some());
    }

    #[test]
    fn cannot_skip_running() {
        let mut r = record();
        let err = r.complete(Utc::now(), summary()).unwrap_err();
        assert!(matches!(err, TaskmonError::InvalidTransition { .. }));
        assert_eq!(r.status(), TaskStatus::Queued);
    }

    #[test]
    fn terminal_states_are_final() {
        let mut r = record();
        r.start(Utc::now()).unwrap();
        r.fail(Utc::now(), summary()).unwrap();
        assert!(r.start(Utc::now()).is_err());
        assert!(r.complete(Utc::now(), summary()).is_err());
        assert_eq!(r.status(), TaskStatus::Failed);
        assert!(r.completed_at().is_some());
        assert!(r.result().is_some());
    }
}
