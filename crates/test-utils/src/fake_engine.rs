use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use taskmon::exec::{EngineError, EngineFuture, EngineOutcome, ExecutionEngine, ExecutionRequest};

/// Scripted outcome of one attempt.
#[derive(Debug, Clone)]
pub enum Script {
    Succeed,
    /// Engine ran and reported failure.
    Fail(String),
    Transient(String),
    Durable(String),
    /// Never returns; only a timeout ends the attempt.
    Hang,
}

/// One call into the fake engine.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub task_id: String,
    pub project: String,
    pub attempt: u32,
    pub content: String,
    pub started: Instant,
    pub finished: Option<Instant>,
}

#[derive(Debug, Default)]
struct FakeState {
    default_delay: Duration,
    delays: HashMap<String, Duration>,
    scripts: HashMap<String, VecDeque<Script>>,
    invocations: Vec<Invocation>,
    active: HashMap<String, usize>,
    max_active: HashMap<String, usize>,
}

/// An execution engine that never spawns processes.
///
/// - records every invocation (with start/finish instants)
/// - sleeps for a configurable per-task delay
/// - plays back scripted outcomes per task id (default: success)
/// - tracks the maximum number of concurrent attempts per project
#[derive(Debug, Clone, Default)]
pub struct FakeEngine {
    state: Arc<Mutex<FakeState>>,
}

/// Decrements the active count even when the attempt future is dropped by a
/// timeout.
struct ActiveGuard {
    state: Arc<Mutex<FakeState>>,
    project: String,
    index: usize,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap();
        if let Some(n) = state.active.get_mut(&self.project) {
            *n = n.saturating_sub(1);
        }
        if let Some(inv) = state.invocations.get_mut(self.index) {
            inv.finished = Some(Instant::now());
        }
    }
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_delay(self, delay: Duration) -> Self {
        self.state.lock().unwrap().default_delay = delay;
        self
    }

    pub fn with_delay(self, task_id: &str, delay: Duration) -> Self {
        self.state
            .lock()
            .unwrap()
            .delays
            .insert(task_id.to_string(), delay);
        self
    }

    /// Outcomes for successive attempts of `task_id`; once exhausted every
    /// further attempt succeeds.
    pub fn with_script(self, task_id: &str, script: Vec<Script>) -> Self {
        self.state
            .lock()
            .unwrap()
            .scripts
            .insert(task_id.to_string(), script.into());
        self
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.state.lock().unwrap().invocations.clone()
    }

    /// Task ids of `project` in the order their first attempt started.
    pub fn started_order(&self, project: &str) -> Vec<String> {
        let mut seen = Vec::new();
        for inv in self.invocations() {
            if inv.project == project && !seen.contains(&inv.task_id) {
                seen.push(inv.task_id);
            }
        }
        seen
    }

    pub fn attempts_of(&self, task_id: &str) -> usize {
        self.invocations()
            .iter()
            .filter(|i| i.task_id == task_id)
            .count()
    }

    pub fn max_concurrency(&self, project: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .max_active
            .get(project)
            .copied()
            .unwrap_or(0)
    }

    fn begin(&self, req: &ExecutionRequest) -> (ActiveGuard, Duration, Script) {
        let mut state = self.state.lock().unwrap();
        state.invocations.push(Invocation {
            task_id: req.task_id.clone(),
            project: req.project.clone(),
            attempt: req.attempt,
            content: req.content.clone(),
            started: Instant::now(),
            finished: None,
        });
        let index = state.invocations.len() - 1;

        let active = state.active.entry(req.project.clone()).or_insert(0);
        *active += 1;
        let now_active = *active;
        let max = state.max_active.entry(req.project.clone()).or_insert(0);
        *max = (*max).max(now_active);

        let delay = state
            .delays
            .get(&req.task_id)
            .copied()
            .unwrap_or(state.default_delay);
        let script = state
            .scripts
            .get_mut(&req.task_id)
            .and_then(|s| s.pop_front())
            .unwrap_or(Script::Succeed);

        (
            ActiveGuard {
                state: self.state.clone(),
                project: req.project.clone(),
                index,
            },
            delay,
            script,
        )
    }
}

impl ExecutionEngine for FakeEngine {
    fn execute(&self, request: ExecutionRequest) -> EngineFuture<'_> {
        Box::pin(async move {
            let (_guard, delay, script) = self.begin(&request);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match script {
                Script::Succeed => Ok(EngineOutcome::success(
                    format!("done {}", request.task_id),
                    format!("output of {}", request.task_id),
                )),
                Script::Fail(msg) => Ok(EngineOutcome::failure(msg, String::new())),
                Script::Transient(msg) => Err(EngineError::Transient(msg)),
                Script::Durable(msg) => Err(EngineError::Durable(msg)),
                Script::Hang => std::future::pending().await,
            }
        })
    }
}
