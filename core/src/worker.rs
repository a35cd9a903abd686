//! Background task execution and status tracking.
//!
//! A task moves Pending → Running → Succeeded | Failed. The registry is the
//! only place task state lives; executors report into it and callers poll
//! it by task id.

use crate::error::AnalyticsResult;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub type TaskId = String;

pub type Job = Box<dyn FnOnce() -> AnalyticsResult<()> + Send + 'static>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed { detail: String },
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed { .. })
    }

    /// Failure detail; `None` until the task has failed.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Failed { detail } => Some(detail),
            _ => None,
        }
    }
}

/// Work delegation seam. The orchestrator schedules, callers poll.
pub trait TaskExecutor: Send + Sync {
    fn schedule(&self, name: &str, job: Job) -> TaskId;

    fn status(&self, id: &str) -> Option<TaskStatus>;

    /// Block until the task is terminal or `timeout` elapses, then return
    /// its status at that moment. `None` for an unknown id.
    fn wait(&self, id: &str, timeout: Option<Duration>) -> Option<TaskStatus>;
}

// ── Registry ───────────────────────────────────────────────────────

#[derive(Default)]
pub struct TaskRegistry {
    states: Mutex<HashMap<TaskId, TaskStatus>>,
    changed: Condvar,
}

impl TaskRegistry {
    pub fn register(&self) -> TaskId {
        let id = uuid::Uuid::new_v4().to_string();
        self.states.lock().insert(id.clone(), TaskStatus::Pending);
        id
    }

    pub fn set(&self, id: &str, status: TaskStatus) {
        self.states.lock().insert(id.to_string(), status);
        self.changed.notify_all();
    }

    pub fn get(&self, id: &str) -> Option<TaskStatus> {
        self.states.lock().get(id).cloned()
    }

    pub fn wait(&self, id: &str, timeout: Option<Duration>) -> Option<TaskStatus> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut states = self.states.lock();
        loop {
            let status = states.get(id)?;
            if status.is_terminal() {
                return Some(status.clone());
            }
            match deadline {
                None => self.changed.wait(&mut states),
                Some(deadline) => {
                    if self.changed.wait_until(&mut states, deadline).timed_out() {
                        return states.get(id).cloned();
                    }
                }
            }
        }
    }

    /// Run `job` to completion, recording every transition.
    fn run(&self, id: &str, name: &str, job: Job) {
        self.set(id, TaskStatus::Running);
        let status = match catch_unwind(AssertUnwindSafe(job)) {
            Ok(Ok(())) => TaskStatus::Succeeded,
            Ok(Err(e)) => {
                log::warn!("task {name} ({id}) failed: {e}");
                TaskStatus::Failed { detail: e.to_string() }
            }
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "task panicked".to_string());
                log::error!("task {name} ({id}) panicked: {detail}");
                TaskStatus::Failed { detail: format!("panicked: {detail}") }
            }
        };
        self.set(id, status);
    }
}

// ── Executors ──────────────────────────────────────────────────────

/// One named OS thread per task.
#[derive(Default)]
pub struct ThreadExecutor {
    registry: Arc<TaskRegistry>,
}

impl ThreadExecutor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskExecutor for ThreadExecutor {
    fn schedule(&self, name: &str, job: Job) -> TaskId {
        let id = self.registry.register();
        let registry = Arc::clone(&self.registry);
        let task_id = id.clone();
        let task_name = name.to_string();

        let spawned = std::thread::Builder::new()
            .name(format!("task-{name}"))
            .spawn(move || registry.run(&task_id, &task_name, job));

        if let Err(e) = spawned {
            log::error!("task {name} ({id}) could not start: {e}");
            self.registry.set(&id, TaskStatus::Failed { detail: format!("could not start: {e}") });
        }
        id
    }

    fn status(&self, id: &str) -> Option<TaskStatus> {
        self.registry.get(id)
    }

    fn wait(&self, id: &str, timeout: Option<Duration>) -> Option<TaskStatus> {
        self.registry.wait(id, timeout)
    }
}

/// Runs each task on the caller's thread before `schedule` returns.
/// Deterministic; used by tests and one-shot tooling.
#[derive(Default)]
pub struct InlineExecutor {
    registry: TaskRegistry,
}

impl InlineExecutor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskExecutor for InlineExecutor {
    fn schedule(&self, name: &str, job: Job) -> TaskId {
        let id = self.registry.register();
        self.registry.run(&id, name, job);
        id
    }

    fn status(&self, id: &str) -> Option<TaskStatus> {
        self.registry.get(id)
    }

    fn wait(&self, id: &str, timeout: Option<Duration>) -> Option<TaskStatus> {
        self.registry.wait(id, timeout)
    }
}
