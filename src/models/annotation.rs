use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ActivityKind {
    Blocked,
    HelpSeeking,
    Tedious,
    Passive,
    Meeting,
    Productive,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::Blocked => "blocked",
            ActivityKind::HelpSeeking => "helpSeeking",
            ActivityKind::Tedious => "tedious",
            ActivityKind::Passive => "passive",
            ActivityKind::Meeting => "meeting",
            ActivityKind::Productive => "productive",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "blocked" => Ok(ActivityKind::Blocked),
            "helpSeeking" => Ok(ActivityKind::HelpSeeking),
            "tedious" => Ok(ActivityKind::Tedious),
            "passive" => Ok(ActivityKind::Passive),
            "meeting" => Ok(ActivityKind::Meeting),
            "productive" => Ok(ActivityKind::Productive),
            other => Err(anyhow!("unknown activity kind '{other}'")),
        }
    }

    /// Whether this kind of activity is one where the user could use a hand.
    pub fn wants_help(&self) -> bool {
        matches!(
            self,
            ActivityKind::Blocked | ActivityKind::HelpSeeking | ActivityKind::Tedious
        )
    }
}

/// How urgently a suggestion should surface: next to the cursor or as a notification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum PopupStyle {
    #[default]
    Cursor,
    Notification,
}

impl PopupStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            PopupStyle::Cursor => "cursor",
            PopupStyle::Notification => "notification",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "cursor" => Ok(PopupStyle::Cursor),
            "notification" => Ok(PopupStyle::Notification),
            other => Err(anyhow!("unknown popup style '{other}'")),
        }
    }
}

/// Interpretation of one batch. Never mutated after creation; subscribers share it
/// behind an `Arc`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    pub task_label: String,
    pub confidence: f64,
    pub summary: String,
    pub activity: ActivityKind,
    pub popup_style: PopupStyle,
    pub app: String,
    pub window_title: String,
    pub timestamp: DateTime<Utc>,
}

impl Annotation {
    pub fn new(
        task_label: impl Into<String>,
        app: impl Into<String>,
        window_title: impl Into<String>,
        confidence: f64,
        activity: ActivityKind,
    ) -> Result<Self> {
        let annotation = Self {
            task_label: task_label.into(),
            confidence,
            summary: String::new(),
            activity,
            popup_style: PopupStyle::default(),
            app: app.into(),
            window_title: window_title.into(),
            timestamp: Utc::now(),
        };
        annotation.validate()?;
        Ok(annotation)
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn with_popup_style(mut self, style: PopupStyle) -> Self {
        self.popup_style = style;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence) {
            bail!(
                "annotation confidence {} is outside [0, 1]",
                self.confidence
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_confidence_out_of_range() {
        assert!(Annotation::new("x", "a", "w", 1.2, ActivityKind::Blocked).is_err());
        assert!(Annotation::new("x", "a", "w", -0.1, ActivityKind::Blocked).is_err());
        assert!(Annotation::new("x", "a", "w", f64::NAN, ActivityKind::Blocked).is_err());
        assert!(Annotation::new("x", "a", "w", 1.0, ActivityKind::Blocked).is_ok());
    }

    #[test]
    fn activity_kind_round_trips_through_storage_names() {
        for kind in [
            ActivityKind::Blocked,
            ActivityKind::HelpSeeking,
            ActivityKind::Tedious,
            ActivityKind::Passive,
            ActivityKind::Meeting,
            ActivityKind::Productive,
        ] {
            assert_eq!(ActivityKind::parse(kind.as_str()).unwrap(), kind);
        }
        assert!(ActivityKind::parse("sleeping").is_err());
    }

    #[test]
    fn decodes_camel_case_json() {
        let json = r#"{
            "taskLabel": "Debugging Python",
            "confidence": 0.9,
            "summary": "stack trace in terminal",
            "activity": "helpSeeking",
            "popupStyle": "notification",
            "app": "Terminal",
            "windowTitle": "shell",
            "timestamp": "2024-05-01T10:00:00Z"
        }"#;
        let annotation: Annotation = serde_json::from_str(json).unwrap();
        assert_eq!(annotation.activity, ActivityKind::HelpSeeking);
        assert_eq!(annotation.popup_style, PopupStyle::Notification);
        assert_eq!(annotation.window_title, "shell");
    }
}
