//! Background search tasks
//!
//! A submitted request runs on its own tokio task with a private
//! cancellation token. Callers keep only the handle and poll for state.
//! Finished entries stay pollable for the configured retention, then are
//! purged on the next access.

use crate::engine::FusionEngine;
use crate::report::SearchReport;
use crate::types::SearchRequest;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Opaque identifier returned by `submit`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskHandle(pub Uuid);

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Observable task state
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Running { progress: u8, step: String },
    Done { result: Box<SearchReport> },
    Failed { error: String },
}

impl TaskState {
    pub fn is_finished(&self) -> bool {
        matches!(self, TaskState::Done { .. } | TaskState::Failed { .. })
    }
}

struct TaskEntry {
    state: TaskState,
    cancel: CancellationToken,
    finished_at: Option<Instant>,
}

impl TaskEntry {
    fn finish(&mut self, state: TaskState) {
        self.state = state;
        self.finished_at = Some(Instant::now());
    }
}

type TaskMap = Arc<RwLock<HashMap<Uuid, TaskEntry>>>;

#[derive(Clone)]
pub struct TaskManager {
    engine: Arc<FusionEngine>,
    tasks: TaskMap,
    retention: Duration,
}

impl TaskManager {
    pub fn new(engine: Arc<FusionEngine>, retention: Duration) -> Self {
        Self {
            engine,
            tasks: Arc::new(RwLock::new(HashMap::new())),
            retention,
        }
    }

    pub fn engine(&self) -> &Arc<FusionEngine> {
        &self.engine
    }

    /// Start a search in the background
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, request: SearchRequest) -> TaskHandle {
        self.purge_expired();

        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        write_lock(&self.tasks).insert(
            id,
            TaskEntry {
                state: TaskState::Pending,
                cancel: cancel.clone(),
                finished_at: None,
            },
        );
        info!(task_id = %id, molecule = %request.molecule, "Search task submitted");

        let engine = Arc::clone(&self.engine);
        let tasks = Arc::clone(&self.tasks);
        tokio::spawn(async move {
            let progress_tasks = Arc::clone(&tasks);
            let sink = move |percent: u8, step: &str| {
                if let Some(entry) = write_lock(&progress_tasks).get_mut(&id) {
                    if !entry.state.is_finished() {
                        entry.state = TaskState::Running {
                            progress: percent,
                            step: step.to_string(),
                        };
                    }
                }
            };

            let outcome = engine.run(request, &sink, cancel).await;

            let mut guard = write_lock(&tasks);
            let Some(entry) = guard.get_mut(&id) else {
                return;
            };
            // A cancelled entry is already terminal
            if entry.state.is_finished() {
                return;
            }
            match outcome {
                Ok(report) => {
                    info!(task_id = %id, "Search task finished");
                    entry.finish(TaskState::Done {
                        result: Box::new(report),
                    });
                }
                Err(e) => {
                    warn!(task_id = %id, error = %e, "Search task failed");
                    entry.finish(TaskState::Failed { error: e.to_string() });
                }
            }
        });

        TaskHandle(id)
    }

    /// Current state, `None` for unknown or expired handles
    pub fn poll(&self, handle: TaskHandle) -> Option<TaskState> {
        self.purge_expired();
        read_lock(&self.tasks).get(&handle.0).map(|e| e.state.clone())
    }

    /// Request cancellation; returns false when the task is unknown or already finished
    pub fn cancel(&self, handle: TaskHandle) -> bool {
        let mut guard = write_lock(&self.tasks);
        let Some(entry) = guard.get_mut(&handle.0) else {
            return false;
        };
        if entry.state.is_finished() {
            return false;
        }
        entry.cancel.cancel();
        entry.finish(TaskState::Failed {
            error: "cancelled".to_string(),
        });
        info!(task_id = %handle, "Search task cancelled");
        true
    }

    fn purge_expired(&self) {
        let retention = self.retention;
        write_lock(&self.tasks)
            .retain(|_, entry| entry.finished_at.map_or(true, |at| at.elapsed() < retention));
    }
}

// A panic while holding the lock leaves the map usable
fn read_lock(tasks: &TaskMap) -> RwLockReadGuard<'_, HashMap<Uuid, TaskEntry>> {
    tasks.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_lock(tasks: &TaskMap) -> RwLockWriteGuard<'_, HashMap<Uuid, TaskEntry>> {
    tasks.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
