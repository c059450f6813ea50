//! A persisted annotation, as written by the persistence consumer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Annotation;
use crate::tasks::{compute_task_id, TaskId};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationRecord {
    pub id: String,
    pub task_id: TaskId,
    pub annotation: Annotation,
    pub recorded_at: DateTime<Utc>,
}

impl AnnotationRecord {
    pub fn new(annotation: &Annotation) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            task_id: compute_task_id(annotation),
            annotation: annotation.clone(),
            recorded_at: Utc::now(),
        }
    }
}
