use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use super::identity::TaskId;

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskState {
    pub current_task_id: Option<TaskId>,
    pub declined: HashSet<TaskId>,
    pub completed: HashSet<TaskId>,
}

/// Dedup state shared by consumers for the lifetime of the process.
///
/// Declined and completed ids never expire: once either set holds an id it stays
/// inert until restart.
#[derive(Clone, Default)]
pub struct TaskStateStore {
    inner: Arc<Mutex<TaskState>>,
}

impl TaskStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TaskState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Returns `true` and records `task_id` as current when it differs from the
    /// current one; `false` with no change otherwise.
    pub fn update_current(&self, task_id: &TaskId) -> bool {
        let mut state = self.lock();
        if state.current_task_id.as_ref() == Some(task_id) {
            return false;
        }
        state.current_task_id = Some(task_id.clone());
        true
    }

    pub fn current(&self) -> Option<TaskId> {
        self.lock().current_task_id.clone()
    }

    pub fn decline(&self, task_id: &TaskId) {
        self.lock().declined.insert(task_id.clone());
    }

    pub fn mark_completed(&self, task_id: &TaskId) {
        self.lock().completed.insert(task_id.clone());
    }

    pub fn was_declined(&self, task_id: &TaskId) -> bool {
        self.lock().declined.contains(task_id)
    }

    pub fn was_completed(&self, task_id: &TaskId) -> bool {
        self.lock().completed.contains(task_id)
    }

    /// Declined or completed, checked under one lock.
    pub fn is_inert(&self, task_id: &TaskId) -> bool {
        let state = self.lock();
        state.declined.contains(task_id) || state.completed.contains(task_id)
    }

    pub fn snapshot(&self) -> TaskState {
        self.lock().clone()
    }
}
