use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::models::Annotation;

/// Stable identity of "the same task" across repeated detections.
///
/// Hex SHA-256 of `task_label|app|window_title`. The field order and the `|`
/// separator are fixed; changing either re-identifies every task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn from_parts(task_label: &str, app: &str, window_title: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(task_label.as_bytes());
        hasher.update(b"|");
        hasher.update(app.as_bytes());
        hasher.update(b"|");
        hasher.update(window_title.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wraps a digest read back from storage.
    pub fn from_hex(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn compute_task_id(annotation: &Annotation) -> TaskId {
    TaskId::from_parts(
        &annotation.task_label,
        &annotation.app,
        &annotation.window_title,
    )
}
