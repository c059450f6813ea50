use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

const DEFAULT_DATA_DIR: &str = ".neb";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub tick_interval_ms: u64,
    pub annotate_timeout_ms: u64,
    pub capture_interval_ms: u64,
    pub capture_timeout_ms: u64,
    /// Take a fresh capture right before each drain instead of relying on the
    /// capture loop's last frame.
    pub refresh_before_drain: bool,
    pub subscriber_capacity: usize,
    pub min_confidence: f64,
    pub annotator_url: String,
    pub api_key: Option<String>,
    /// Screenshot command; `{path}` is replaced with the PNG destination.
    pub screenshot_command: Vec<String>,
    /// Prints the frontmost app on line 1 and its window title on line 2.
    pub window_command: Vec<String>,
    pub ocr_script: Option<PathBuf>,
    pub ocr_python: String,
    pub ocr_cooldown_ms: u64,
    pub phash_change_threshold: u32,
    pub database_file: String,
    pub interactive: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 2_000,
            annotate_timeout_ms: 30_000,
            capture_interval_ms: 2_000,
            capture_timeout_ms: 10_000,
            refresh_before_drain: true,
            subscriber_capacity: 32,
            min_confidence: 0.4,
            annotator_url: "http://127.0.0.1:8787".into(),
            api_key: None,
            screenshot_command: vec![
                "screencapture".into(),
                "-x".into(),
                "-t".into(),
                "png".into(),
                "{path}".into(),
            ],
            window_command: vec![
                "osascript".into(),
                "-e".into(),
                FRONT_WINDOW_SCRIPT.into(),
            ],
            ocr_script: None,
            ocr_python: "python3".into(),
            ocr_cooldown_ms: 20_000,
            phash_change_threshold: 8,
            database_file: "neb.sqlite3".into(),
            interactive: true,
        }
    }
}

const FRONT_WINDOW_SCRIPT: &str = r#"tell application "System Events"
set frontApp to first application process whose frontmost is true
set appName to name of frontApp
set winTitle to ""
try
set winTitle to name of front window of frontApp
end try
end tell
return appName & linefeed & winTitle"#;

impl Settings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn annotate_timeout(&self) -> Duration {
        Duration::from_millis(self.annotate_timeout_ms.max(1))
    }

    pub fn capture_interval(&self) -> Duration {
        Duration::from_millis(self.capture_interval_ms.max(1))
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_timeout_ms.max(1))
    }

    pub fn ocr_cooldown(&self) -> Duration {
        Duration::from_millis(self.ocr_cooldown_ms)
    }

    /// Environment variables win over the file.
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("NEB_ANNOTATOR_URL") {
            self.annotator_url = url;
        }
        if let Ok(key) = std::env::var("NEB_API_KEY") {
            self.api_key = Some(key);
        }
        if crate::utils::debug_enabled() {
            self.tick_interval_ms = self.tick_interval_ms.min(500);
        }
    }
}

/// Directory for the settings file and database: `NEB_DATA_DIR` or `./.neb`.
pub fn data_dir() -> PathBuf {
    std::env::var_os("NEB_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<Settings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let mut data = load_from(&path)?;
        data.apply_env_overrides();

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, Settings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Settings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn settings(&self) -> Settings {
        self.read().clone()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn update(&self, settings: Settings) -> Result<()> {
        let mut guard = self.write();
        *guard = settings;
        self.persist(&guard)
    }

    pub fn reload(&self) -> Result<()> {
        let mut data = load_from(&self.path)?;
        data.apply_env_overrides();
        *self.write() = data;
        Ok(())
    }

    fn persist(&self, data: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create settings directory {}", parent.display())
            })?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

fn load_from(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings from {}", path.display()))?;
    Ok(serde_json::from_str(&contents).unwrap_or_else(|err| {
        warn!("Ignoring malformed settings at {}: {err}", path.display());
        Settings::default()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();
        let settings = store.settings();
        assert_eq!(settings.subscriber_capacity, 32);
        assert_eq!(settings.min_confidence, 0.4);
        assert!(settings.refresh_before_drain);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"subscriber_capacity": 4, "interactive": false}"#).unwrap();

        let settings = SettingsStore::new(path).unwrap().settings();
        assert_eq!(settings.subscriber_capacity, 4);
        assert!(!settings.interactive);
        assert_eq!(settings.annotate_timeout_ms, 30_000);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{not json").unwrap();

        let settings = SettingsStore::new(path).unwrap().settings();
        assert_eq!(settings.database_file, "neb.sqlite3");
    }

    #[test]
    fn update_persists_and_reload_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();

        let mut settings = store.settings();
        settings.ocr_cooldown_ms = 1_234;
        store.update(settings).unwrap();
        assert!(path.exists());

        store.reload().unwrap();
        assert_eq!(store.settings().ocr_cooldown_ms, 1_234);
    }
}
