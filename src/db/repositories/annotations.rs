use anyhow::Result;
use rusqlite::{params, Row};

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, to_i64},
    models::AnnotationRecord,
};
use crate::models::{ActivityKind, Annotation, PopupStyle};
use crate::tasks::TaskId;

const SELECT_COLUMNS: &str = "id, task_id, task_label, confidence, summary, activity, \
     popup_style, app, window_title, annotated_at, recorded_at";

fn row_to_record(row: &Row) -> Result<AnnotationRecord> {
    let activity: String = row.get("activity")?;
    let popup_style: String = row.get("popup_style")?;
    let annotated_at: String = row.get("annotated_at")?;
    let recorded_at: String = row.get("recorded_at")?;

    Ok(AnnotationRecord {
        id: row.get("id")?,
        task_id: TaskId::from_hex(row.get::<_, String>("task_id")?),
        annotation: Annotation {
            task_label: row.get("task_label")?,
            confidence: row.get("confidence")?,
            summary: row.get("summary")?,
            activity: ActivityKind::parse(&activity)?,
            popup_style: PopupStyle::parse(&popup_style)?,
            app: row.get("app")?,
            window_title: row.get("window_title")?,
            timestamp: parse_datetime(&annotated_at, "annotated_at")?,
        },
        recorded_at: parse_datetime(&recorded_at, "recorded_at")?,
    })
}

fn collect_records(rows: &mut rusqlite::Rows<'_>) -> Result<Vec<AnnotationRecord>> {
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        records.push(row_to_record(row)?);
    }
    Ok(records)
}

impl Database {
    pub async fn insert_annotation(&self, record: &AnnotationRecord) -> Result<()> {
        let record = record.clone();
        self.execute(move |conn| {
            let a = &record.annotation;
            conn.execute(
                "INSERT INTO annotations (
                    id,
                    task_id,
                    task_label,
                    confidence,
                    summary,
                    activity,
                    popup_style,
                    app,
                    window_title,
                    annotated_at,
                    recorded_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    record.id,
                    record.task_id.as_str(),
                    a.task_label,
                    a.confidence,
                    a.summary,
                    a.activity.as_str(),
                    a.popup_style.as_str(),
                    a.app,
                    a.window_title,
                    a.timestamp.to_rfc3339(),
                    record.recorded_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Newest first.
    pub async fn get_recent_annotations(&self, limit: u64) -> Result<Vec<AnnotationRecord>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM annotations
                 ORDER BY annotated_at DESC, rowid DESC
                 LIMIT ?1"
            ))?;
            let mut rows = stmt.query(params![to_i64(limit)?])?;
            collect_records(&mut rows)
        })
        .await
    }

    /// Oldest first.
    pub async fn get_annotations_for_task(&self, task_id: &TaskId) -> Result<Vec<AnnotationRecord>> {
        let task_id = task_id.as_str().to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM annotations
                 WHERE task_id = ?1
                 ORDER BY annotated_at ASC, rowid ASC"
            ))?;
            let mut rows = stmt.query(params![task_id])?;
            collect_records(&mut rows)
        })
        .await
    }

    pub async fn count_annotations(&self) -> Result<u64> {
        self.execute(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM annotations", [], |row| row.get(0))?;
            Ok(count.max(0) as u64)
        })
        .await
    }
}
