use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use tokio::{process::Command, sync::Mutex, time::Instant};
use uuid::Uuid;

use crate::models::ScreenSnapshot;
use crate::settings::Settings;

use super::ocr::TextExtractor;
use super::phash::{compute_phash, frame_changed};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

/// Frames smaller than this are almost always a hidden or minimized window.
const MIN_FRAME_BYTES: usize = 1000;

/// Produces screen snapshots. Any failure is reported as `None`.
#[async_trait]
pub trait ScreenCapture: Send + Sync {
    async fn capture_snapshot(&self) -> Option<ScreenSnapshot>;
}

/// Decides when a frame is worth sending through OCR again.
#[derive(Debug, Default)]
pub struct OcrGate {
    last_ocr_phash: Option<String>,
    last_ocr_time: Option<Instant>,
    last_text: Option<String>,
    change_threshold: u32,
    cooldown: Duration,
}

impl OcrGate {
    pub fn new(change_threshold: u32, cooldown: Duration) -> Self {
        Self {
            change_threshold,
            cooldown,
            ..Self::default()
        }
    }

    pub fn should_run(&self, current_phash: &str) -> bool {
        if self.last_ocr_phash.is_none() {
            return true;
        }
        if !self.cooldown_elapsed() {
            return false;
        }
        frame_changed(
            self.last_ocr_phash.as_deref(),
            current_phash,
            self.change_threshold,
        )
    }

    fn cooldown_elapsed(&self) -> bool {
        self.last_ocr_time
            .map(|instant| instant.elapsed() >= self.cooldown)
            .unwrap_or(true)
    }

    pub fn record(&mut self, phash: &str, text: String) {
        self.record_attempt(phash);
        self.last_text = Some(text);
    }

    /// Marks an extraction attempt on `phash` without new text. A failed run still
    /// starts the cooldown; the previous text stays available.
    pub fn record_attempt(&mut self, phash: &str) {
        self.last_ocr_phash = Some(phash.to_string());
        self.last_ocr_time = Some(Instant::now());
    }

    /// Text from the last successful extraction, reused while the frame is stable.
    pub fn last_text(&self) -> Option<String> {
        self.last_text.clone()
    }
}

/// Captures by shelling out to a screenshot command and a window-info command.
pub struct CommandCapture {
    screenshot_command: Vec<String>,
    window_command: Vec<String>,
    ocr: Option<Arc<dyn TextExtractor>>,
    gate: Mutex<OcrGate>,
    frame_dir: PathBuf,
}

impl CommandCapture {
    pub fn new(settings: &Settings, ocr: Option<Arc<dyn TextExtractor>>) -> Self {
        Self {
            screenshot_command: settings.screenshot_command.clone(),
            window_command: settings.window_command.clone(),
            ocr,
            gate: Mutex::new(OcrGate::new(
                settings.phash_change_threshold,
                settings.ocr_cooldown(),
            )),
            frame_dir: std::env::temp_dir(),
        }
    }

    /// Where screenshots are written before being read back. Defaults to the
    /// system temp dir.
    pub fn with_frame_dir(mut self, dir: PathBuf) -> Self {
        self.frame_dir = dir;
        self
    }

    async fn window_metadata(&self) -> Result<(String, String)> {
        let stdout = run_command(&self.window_command, None).await?;
        parse_window_metadata(&stdout)
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        let path = self.frame_dir.join(format!("neb-frame-{}.png", Uuid::new_v4()));
        let path_str = path.to_string_lossy().into_owned();

        let bytes = match run_command(&self.screenshot_command, Some(&path_str)).await {
            Ok(_) => tokio::fs::read(&path)
                .await
                .with_context(|| format!("screenshot command wrote nothing to {path_str}")),
            Err(err) => Err(err),
        };

        // The command may have left a partial frame behind even when it failed.
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => log_debug!("could not remove frame {path_str}: {err}"),
        }
        bytes
    }

    async fn try_capture(&self) -> Result<ScreenSnapshot> {
        let capture_start = Instant::now();
        let (app, window_title) = self.window_metadata().await?;
        let mut snapshot = ScreenSnapshot::new(app, window_title);

        let png_bytes = self.screenshot().await?;
        if png_bytes.len() < MIN_FRAME_BYTES {
            log_debug!(
                "frame for {} is only {} bytes; keeping metadata only",
                snapshot.app,
                png_bytes.len()
            );
            return Ok(snapshot);
        }

        let png = Arc::new(png_bytes);
        let phash = tokio::task::spawn_blocking({
            let bytes = Arc::clone(&png);
            move || compute_phash(&bytes)
        })
        .await
        .context("phash worker join failed")??;

        snapshot.ocr_text = self.read_text(&png, &phash).await;
        snapshot.phash = Some(phash);
        snapshot.png = png;

        log_debug!(
            "captured {} / {} in {}ms",
            snapshot.app,
            snapshot.window_title,
            capture_start.elapsed().as_millis()
        );
        Ok(snapshot)
    }

    async fn read_text(&self, png: &[u8], phash: &str) -> Option<String> {
        let ocr = self.ocr.as_ref()?;
        let mut gate = self.gate.lock().await;
        if !gate.should_run(phash) {
            return gate.last_text();
        }

        match ocr.extract_text(png).await {
            Ok(text) => {
                gate.record(phash, text.clone());
                Some(text)
            }
            Err(err) => {
                log_warn!("ocr failed: {err:#}");
                gate.record_attempt(phash);
                gate.last_text()
            }
        }
    }
}

#[async_trait]
impl ScreenCapture for CommandCapture {
    async fn capture_snapshot(&self) -> Option<ScreenSnapshot> {
        match self.try_capture().await {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                log_warn!("screen capture failed: {err:#}");
                None
            }
        }
    }
}

async fn run_command(argv: &[String], path: Option<&str>) -> Result<String> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| anyhow!("capture command is empty"))?;
    let args = args.iter().map(|arg| match path {
        Some(path) => arg.replace("{path}", path),
        None => arg.clone(),
    });

    let output = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .with_context(|| format!("failed to launch {program}"))?;

    if !output.status.success() {
        bail!(
            "{program} exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Line 1 is the app name, line 2 (optional) the window title.
pub fn parse_window_metadata(stdout: &str) -> Result<(String, String)> {
    let mut lines = stdout.lines().map(str::trim);
    let app = lines
        .next()
        .filter(|app| !app.is_empty())
        .ok_or_else(|| anyhow!("window command printed no app name"))?;
    let title = lines.next().unwrap_or_default();
    Ok((app.to_string(), title.to_string()))
}
