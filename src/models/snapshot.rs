use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A raw activity marker appended to the event buffer between ticks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "value")]
pub enum ActivitySignal {
    /// Typed text (or a tally marker standing in for it).
    Keystrokes(String),
    /// A named shortcut such as `cmd+tab`.
    Shortcut(String),
}

impl ActivitySignal {
    pub fn marker(&self) -> String {
        match self {
            ActivitySignal::Keystrokes(text) => text.clone(),
            ActivitySignal::Shortcut(name) => format!("[{name}]"),
        }
    }
}

impl From<&str> for ActivitySignal {
    fn from(value: &str) -> Self {
        ActivitySignal::Keystrokes(value.to_string())
    }
}

impl From<String> for ActivitySignal {
    fn from(value: String) -> Self {
        ActivitySignal::Keystrokes(value)
    }
}

/// The most recent captured frame plus its window metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenSnapshot {
    pub app: String,
    pub window_title: String,
    pub captured_at: DateTime<Utc>,
    /// PNG bytes of the frame. Shared so batches don't copy the image.
    #[serde(skip)]
    pub png: Arc<Vec<u8>>,
    pub phash: Option<String>,
    pub ocr_text: Option<String>,
}

impl ScreenSnapshot {
    pub fn new(app: impl Into<String>, window_title: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            window_title: window_title.into(),
            captured_at: Utc::now(),
            png: Arc::new(Vec::new()),
            phash: None,
            ocr_text: None,
        }
    }
}

/// One drained unit of accumulated signals plus the snapshot handed to the annotator.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub signals: String,
    pub signal_count: usize,
    pub snapshot: Option<ScreenSnapshot>,
    pub drained_at: DateTime<Utc>,
}

impl Batch {
    pub fn app(&self) -> Option<&str> {
        self.snapshot.as_ref().map(|s| s.app.as_str())
    }

    pub fn window_title(&self) -> Option<&str> {
        self.snapshot.as_ref().map(|s| s.window_title.as_str())
    }
}
