pub mod backend;
pub mod consumers;
pub mod db;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod prompt;
pub mod sensing;
pub mod settings;
pub mod tasks;
pub mod utils;

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use backend::{AnnotationClient, HttpAnnotationClient, HttpAutomationExecutor};
use consumers::{AnnotationHandler, DecisionConsumer, PersistenceConsumer};
use db::Database;
use metrics::MetricsCollector;
use pipeline::{Broadcaster, CaptureLoopConfig, DriverConfig, PipelineController, PipelineDriver};
use sensing::{CommandCapture, EventBuffer, ScreenCapture, ScriptOcr, TextExtractor};
use settings::SettingsStore;
use tasks::TaskStateStore;

/// Runs the pipeline until Ctrl-C.
pub async fn run() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    info!("neb starting up...");

    let data_dir = settings::data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

    let settings_store = SettingsStore::new(data_dir.join("settings.json"))?;
    let settings = settings_store.settings();
    let database = Database::new(data_dir.join(&settings.database_file))?;

    let buffer = EventBuffer::new();
    let broadcaster = Broadcaster::new(settings.subscriber_capacity);
    let task_state = TaskStateStore::new();
    let metrics = MetricsCollector::new();

    let ocr = settings.ocr_script.clone().map(|script| {
        Arc::new(ScriptOcr::new(settings.ocr_python.clone(), script)) as Arc<dyn TextExtractor>
    });
    let capture: Arc<dyn ScreenCapture> = Arc::new(CommandCapture::new(&settings, ocr));
    let annotator: Arc<dyn AnnotationClient> = Arc::new(HttpAnnotationClient::new(
        &settings.annotator_url,
        settings.api_key.clone(),
        settings.annotate_timeout(),
    )?);
    let executor = Arc::new(HttpAutomationExecutor::new(
        &settings.annotator_url,
        settings.api_key.clone(),
        settings.annotate_timeout(),
    )?);

    let driver = PipelineDriver::new(
        buffer.clone(),
        annotator,
        broadcaster.clone(),
        DriverConfig::from(&settings),
    )
    .with_capture(Arc::clone(&capture))
    .with_metrics(metrics.clone());

    let (decision, suggestions) = DecisionConsumer::new(
        task_state,
        settings.min_confidence,
        settings.subscriber_capacity,
    );
    let decision = decision.with_executor(executor);
    let consumers: Vec<Arc<dyn AnnotationHandler>> = vec![
        Arc::new(PersistenceConsumer::new(database.clone())),
        Arc::new(decision.clone()),
    ];

    let mut controller = PipelineController::new();
    controller.start(
        driver,
        &broadcaster,
        consumers,
        Some(CaptureLoopConfig {
            capture,
            buffer,
            interval: settings.capture_interval(),
            timeout: settings.capture_timeout(),
        }),
    )?;

    let prompt_token = CancellationToken::new();
    let prompt = tokio::spawn(prompt::suggestion_prompt(
        decision,
        suggestions,
        settings.interactive,
        prompt_token.clone(),
    ));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("shutting down");

    prompt_token.cancel();
    controller.stop().await?;
    if let Err(err) = prompt.await {
        warn!("suggestion prompt task failed: {err}");
    }

    let snapshot = metrics.get_snapshot().await;
    info!(
        "{} ticks ({} published, {} empty, {} failed, {} dropped deliveries); cpu {:.1}%, rss {:.1} MB",
        snapshot.tick_count,
        snapshot.published_count,
        snapshot.empty_count,
        snapshot.failed_count,
        snapshot.dropped_deliveries,
        snapshot.system.cpu_percent,
        snapshot.system.memory_mb
    );
    match database.count_annotations().await {
        Ok(count) => info!("{count} annotations stored in {}", database.path().display()),
        Err(err) => warn!("could not count stored annotations: {err:#}"),
    }

    Ok(())
}
