use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::db::{AnnotationRecord, Database};
use crate::models::Annotation;

use super::AnnotationHandler;

/// Writes every annotation it receives to the `annotations` table.
pub struct PersistenceConsumer {
    db: Database,
}

impl PersistenceConsumer {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AnnotationHandler for PersistenceConsumer {
    fn name(&self) -> &str {
        "persistence"
    }

    async fn handle(&self, annotation: Arc<Annotation>) -> Result<()> {
        let record = AnnotationRecord::new(&annotation);
        self.db
            .insert_annotation(&record)
            .await
            .with_context(|| format!("failed to persist annotation for task {}", record.task_id))
    }
}
