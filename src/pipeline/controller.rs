use std::sync::Arc;

use anyhow::{bail, Context, Result};
use log::{error, info};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::consumers::{consumer_loop, AnnotationHandler};
use crate::models::Annotation;
use crate::sensing::{capture_loop, EventBuffer, ScreenCapture};

use super::broadcast::Broadcaster;
use super::driver::PipelineDriver;

/// The producer side of the pipeline: keeps the buffer's snapshot fresh.
pub struct CaptureLoopConfig {
    pub capture: Arc<dyn ScreenCapture>,
    pub buffer: EventBuffer,
    pub interval: Duration,
    pub timeout: Duration,
}

/// Starts and stops the capture loop, the driver and the consumers as one unit.
///
/// Every task runs on a child of one cancellation token. Stopping cancels the parent
/// and waits for all of them.
pub struct PipelineController {
    cancel_token: Option<CancellationToken>,
    handles: Vec<(String, JoinHandle<()>)>,
}

impl PipelineController {
    pub fn new() -> Self {
        Self {
            cancel_token: None,
            handles: Vec::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.cancel_token.is_some()
    }

    pub fn start(
        &mut self,
        driver: PipelineDriver,
        broadcaster: &Broadcaster<Arc<Annotation>>,
        consumers: Vec<Arc<dyn AnnotationHandler>>,
        capture: Option<CaptureLoopConfig>,
    ) -> Result<()> {
        if self.is_running() {
            bail!("pipeline already active");
        }

        let cancel_token = CancellationToken::new();

        // Subscribe before the driver runs so no consumer misses the first tick.
        for handler in consumers {
            let name = handler.name().to_string();
            let subscription = broadcaster.subscribe();
            let token = cancel_token.child_token();
            let task_name = name.clone();
            let handle = tokio::spawn(async move {
                let stats = consumer_loop(handler, subscription, token).await;
                info!(
                    "{task_name} consumer stopped: {} handled, {} failed, {} panicked",
                    stats.handled, stats.failed, stats.panicked
                );
            });
            self.handles.push((name, handle));
        }

        if let Some(config) = capture {
            let handle = tokio::spawn(capture_loop(
                config.capture,
                config.buffer,
                config.interval,
                config.timeout,
                cancel_token.child_token(),
            ));
            self.handles.push(("capture".into(), handle));
        }

        let handle = tokio::spawn(driver.run(cancel_token.child_token()));
        self.handles.push(("driver".into(), handle));

        self.cancel_token = Some(cancel_token);
        info!("pipeline started with {} tasks", self.handles.len());
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        join_all(std::mem::take(&mut self.handles)).await
    }
}

/// Waits for every task, then reports the first one that failed to join.
async fn join_all(handles: Vec<(String, JoinHandle<()>)>) -> Result<()> {
    let mut first_err = None;
    for (name, handle) in handles {
        let joined = handle
            .await
            .with_context(|| format!("{name} task failed to join"));
        if let Err(err) = joined {
            error!("{err:#}");
            first_err.get_or_insert(err);
        }
    }
    match first_err {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

impl Default for PipelineController {
    fn default() -> Self {
        Self::new()
    }
}
