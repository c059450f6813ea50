use std::sync::Arc;

use chrono::Utc;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::backend::AnnotationClient;
use crate::metrics::{MetricsCollector, TickMetrics, TickOutcomeKind};
use crate::models::Annotation;
use crate::sensing::{EventBuffer, ScreenCapture};
use crate::settings::Settings;

use super::broadcast::{Broadcaster, PublishReport};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub tick_interval: Duration,
    pub annotate_timeout: Duration,
    pub capture_timeout: Duration,
    pub refresh_before_drain: bool,
}

impl From<&Settings> for DriverConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            tick_interval: settings.tick_interval(),
            annotate_timeout: settings.annotate_timeout(),
            capture_timeout: settings.capture_timeout(),
            refresh_before_drain: settings.refresh_before_drain,
        }
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing pending, or the buffer was drained by someone else first.
    Empty,
    Published(PublishReport),
    Failed,
    TimedOut,
}

impl TickOutcome {
    fn kind(&self) -> TickOutcomeKind {
        match self {
            TickOutcome::Empty => TickOutcomeKind::Empty,
            TickOutcome::Published(_) => TickOutcomeKind::Published,
            TickOutcome::Failed => TickOutcomeKind::Failed,
            TickOutcome::TimedOut => TickOutcomeKind::TimedOut,
        }
    }
}

/// Periodic loop: drain the buffer, annotate, publish.
///
/// Ticks are serialized. An annotate call finishes (or times out) before the next
/// tick starts, so at most one request is in flight.
pub struct PipelineDriver {
    buffer: EventBuffer,
    annotator: Arc<dyn AnnotationClient>,
    capture: Option<Arc<dyn ScreenCapture>>,
    broadcaster: Broadcaster<Arc<Annotation>>,
    metrics: MetricsCollector,
    config: DriverConfig,
}

impl PipelineDriver {
    pub fn new(
        buffer: EventBuffer,
        annotator: Arc<dyn AnnotationClient>,
        broadcaster: Broadcaster<Arc<Annotation>>,
        config: DriverConfig,
    ) -> Self {
        Self {
            buffer,
            annotator,
            capture: None,
            broadcaster,
            metrics: MetricsCollector::new(),
            config,
        }
    }

    /// Used for the pre-drain refresh when `refresh_before_drain` is set.
    pub fn with_capture(mut self, capture: Arc<dyn ScreenCapture>) -> Self {
        self.capture = Some(capture);
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = metrics;
        self
    }

    pub async fn run(self, cancel_token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut tick_no: u64 = 0;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tick_no = tick_no.wrapping_add(1);
                    let outcome = self.tick().await;
                    log_debug!("tick {tick_no}: {outcome:?}");
                }
                _ = cancel_token.cancelled() => {
                    log_info!("pipeline driver shutting down");
                    break;
                }
            }
        }
    }

    pub async fn tick(&self) -> TickOutcome {
        let tick_start = Instant::now();

        if !self.buffer.has_pending_data() {
            self.record(tick_start, &TickOutcome::Empty, 0, false, None).await;
            return TickOutcome::Empty;
        }

        if self.config.refresh_before_drain {
            self.refresh_snapshot().await;
        }

        let Some(batch) = self.buffer.drain_and_clear() else {
            self.record(tick_start, &TickOutcome::Empty, 0, false, None).await;
            return TickOutcome::Empty;
        };
        let signal_count = batch.signal_count;
        let had_snapshot = batch.snapshot.is_some();

        let annotate_start = Instant::now();
        let result =
            tokio::time::timeout(self.config.annotate_timeout, self.annotator.annotate(&batch))
                .await;
        let annotate_ms = Some(annotate_start.elapsed().as_millis() as u64);

        let outcome = match result {
            Ok(Ok(annotation)) => {
                log_debug!(
                    "annotated '{}' ({:?}, confidence {:.2})",
                    annotation.task_label,
                    annotation.activity,
                    annotation.confidence
                );
                let report = self.broadcaster.publish(Arc::new(annotation));
                if report.dropped > 0 {
                    log_warn!("{} subscriber(s) were full and missed this annotation", report.dropped);
                }
                TickOutcome::Published(report)
            }
            Ok(Err(err)) => {
                log_warn!("annotate failed: {err:#}");
                TickOutcome::Failed
            }
            Err(_) => {
                log_warn!(
                    "annotate timeout (> {}ms)",
                    self.config.annotate_timeout.as_millis()
                );
                TickOutcome::TimedOut
            }
        };

        self.record(tick_start, &outcome, signal_count, had_snapshot, annotate_ms)
            .await;
        outcome
    }

    async fn refresh_snapshot(&self) {
        let Some(capture) = &self.capture else {
            return;
        };
        match tokio::time::timeout(self.config.capture_timeout, capture.capture_snapshot()).await {
            Ok(Some(snapshot)) => self.buffer.update_snapshot(snapshot),
            Ok(None) => log_debug!("pre-drain capture returned nothing; using buffered snapshot"),
            Err(_) => log_warn!("pre-drain capture timeout"),
        }
    }

    async fn record(
        &self,
        tick_start: Instant,
        outcome: &TickOutcome,
        signal_count: usize,
        had_snapshot: bool,
        annotate_ms: Option<u64>,
    ) {
        let (delivered, dropped) = match outcome {
            TickOutcome::Published(report) => (report.delivered, report.dropped),
            _ => (0, 0),
        };
        self.metrics
            .record_tick(TickMetrics {
                timestamp: Utc::now(),
                outcome: outcome.kind(),
                signal_count,
                had_snapshot,
                annotate_ms,
                delivered,
                dropped,
                total_ms: tick_start.elapsed().as_millis() as u64,
            })
            .await;
    }
}
