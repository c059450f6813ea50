use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::models::{ActivityKind, Annotation, Batch, PopupStyle};

/// Interprets a batch. May be slow; failure is reported, never retried here.
#[async_trait]
pub trait AnnotationClient: Send + Sync {
    async fn annotate(&self, batch: &Batch) -> Result<Annotation>;
}

pub struct HttpAnnotationClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpAnnotationClient {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build annotation HTTP client")?;
        Ok(Self {
            client,
            endpoint: format!("{}/annotate", base_url.trim_end_matches('/')),
            api_key,
        })
    }
}

#[async_trait]
impl AnnotationClient for HttpAnnotationClient {
    async fn annotate(&self, batch: &Batch) -> Result<Annotation> {
        let mut request = self.client.post(&self.endpoint).json(&AnnotateRequest::from(batch));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("annotate request to {} failed", self.endpoint))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("annotate API error {status}: {error_text}"));
        }

        let body: AnnotateResponse = response
            .json()
            .await
            .context("annotate response was not valid JSON")?;
        body.into_annotation(batch)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateRequest<'a> {
    signals: &'a str,
    signal_count: usize,
    app: Option<&'a str>,
    window_title: Option<&'a str>,
    ocr_text: Option<&'a str>,
    phash: Option<&'a str>,
    captured_at: Option<DateTime<Utc>>,
    drained_at: DateTime<Utc>,
}

impl<'a> From<&'a Batch> for AnnotateRequest<'a> {
    fn from(batch: &'a Batch) -> Self {
        let snapshot = batch.snapshot.as_ref();
        Self {
            signals: &batch.signals,
            signal_count: batch.signal_count,
            app: batch.app(),
            window_title: batch.window_title(),
            ocr_text: snapshot.and_then(|s| s.ocr_text.as_deref()),
            phash: snapshot.and_then(|s| s.phash.as_deref()),
            captured_at: snapshot.map(|s| s.captured_at),
            drained_at: batch.drained_at,
        }
    }
}

/// Service reply. App and window fall back to the batch's snapshot when omitted.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotateResponse {
    task_label: String,
    confidence: f64,
    #[serde(default)]
    summary: String,
    activity: ActivityKind,
    #[serde(default)]
    popup_style: PopupStyle,
    app: Option<String>,
    window_title: Option<String>,
    timestamp: Option<DateTime<Utc>>,
}

impl AnnotateResponse {
    pub fn into_annotation(self, batch: &Batch) -> Result<Annotation> {
        let annotation = Annotation {
            task_label: self.task_label,
            confidence: self.confidence,
            summary: self.summary,
            activity: self.activity,
            popup_style: self.popup_style,
            app: self
                .app
                .or_else(|| batch.app().map(str::to_string))
                .unwrap_or_default(),
            window_title: self
                .window_title
                .or_else(|| batch.window_title().map(str::to_string))
                .unwrap_or_default(),
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
        };
        annotation.validate()?;
        Ok(annotation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScreenSnapshot;

    fn batch_with_snapshot() -> Batch {
        Batch {
            signals: "import pdb".into(),
            signal_count: 1,
            snapshot: Some(ScreenSnapshot::new("Terminal", "shell")),
            drained_at: Utc::now(),
        }
    }

    #[test]
    fn fills_missing_window_fields_from_batch() {
        let body: AnnotateResponse = serde_json::from_str(
            r#"{"taskLabel": "Debugging Python", "confidence": 0.9, "activity": "blocked"}"#,
        )
        .unwrap();
        let annotation = body.into_annotation(&batch_with_snapshot()).unwrap();

        assert_eq!(annotation.app, "Terminal");
        assert_eq!(annotation.window_title, "shell");
        assert_eq!(annotation.popup_style, PopupStyle::Cursor);
        assert_eq!(annotation.summary, "");
    }

    #[test]
    fn response_fields_win_over_batch() {
        let body: AnnotateResponse = serde_json::from_str(
            r#"{"taskLabel": "Reading docs", "confidence": 0.5, "activity": "passive",
                "app": "Safari", "windowTitle": "Rust Book", "popupStyle": "notification"}"#,
        )
        .unwrap();
        let annotation = body.into_annotation(&batch_with_snapshot()).unwrap();
        assert_eq!(annotation.app, "Safari");
        assert_eq!(annotation.window_title, "Rust Book");
    }

    #[test]
    fn rejects_out_of_range_confidence() {
        let body: AnnotateResponse = serde_json::from_str(
            r#"{"taskLabel": "x", "confidence": 4.0, "activity": "tedious"}"#,
        )
        .unwrap();
        assert!(body.into_annotation(&batch_with_snapshot()).is_err());
    }

    #[test]
    fn request_carries_snapshot_metadata() {
        let batch = batch_with_snapshot();
        let json = serde_json::to_value(AnnotateRequest::from(&batch)).unwrap();
        assert_eq!(json["app"], "Terminal");
        assert_eq!(json["signalCount"], 1);
        assert!(json["ocrText"].is_null());
    }

    #[test]
    fn endpoint_strips_trailing_slash() {
        let client =
            HttpAnnotationClient::new("http://localhost:9/", None, Duration::from_secs(1)).unwrap();
        assert_eq!(client.endpoint, "http://localhost:9/annotate");
    }
}
