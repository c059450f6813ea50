use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use uuid::Uuid;

#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract_text(&self, png_bytes: &[u8]) -> Result<String>;
}

/// Runs an external OCR script as `<python> <script> <image_path>`.
///
/// The script prints one JSON object on stdout, either `{"text": ...}` or
/// `{"error": ...}`. Anything it writes to stderr is progress chatter.
pub struct ScriptOcr {
    python: String,
    script: PathBuf,
}

#[derive(Deserialize)]
struct ScriptOutput {
    text: Option<String>,
    error: Option<String>,
}

impl ScriptOcr {
    pub fn new(python: impl Into<String>, script: PathBuf) -> Self {
        Self {
            python: python.into(),
            script,
        }
    }
}

#[async_trait]
impl TextExtractor for ScriptOcr {
    async fn extract_text(&self, png_bytes: &[u8]) -> Result<String> {
        let image_path = std::env::temp_dir().join(format!("neb-ocr-{}.png", Uuid::new_v4()));
        tokio::fs::write(&image_path, png_bytes)
            .await
            .with_context(|| format!("failed to write OCR input {}", image_path.display()))?;

        let output = Command::new(&self.python)
            .arg(&self.script)
            .arg(&image_path)
            .kill_on_drop(true)
            .output()
            .await;

        if let Err(err) = tokio::fs::remove_file(&image_path).await {
            log::debug!("could not remove OCR input {}: {err}", image_path.display());
        }

        let output = output.with_context(|| {
            format!("failed to launch OCR script {}", self.script.display())
        })?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let parsed = parse_script_output(&stdout);

        if !output.status.success() {
            let reason = parsed
                .err()
                .map(|e| e.to_string())
                .unwrap_or_else(|| format!("exit status {}", output.status));
            bail!("OCR script failed: {reason}");
        }
        parsed
    }
}

/// Takes the last JSON line of the script's stdout.
pub fn parse_script_output(stdout: &str) -> Result<String> {
    let line = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| line.starts_with('{'))
        .ok_or_else(|| anyhow!("OCR script printed no JSON result"))?;

    let output: ScriptOutput =
        serde_json::from_str(line).context("OCR script printed malformed JSON")?;
    match (output.text, output.error) {
        (_, Some(error)) => Err(anyhow!("OCR script reported: {error}")),
        (Some(text), None) => Ok(text),
        (None, None) => Err(anyhow!("OCR script result has neither text nor error")),
    }
}
