//! Downstream consumers of published annotations.
//!
//! Each consumer owns one subscription and runs in its own task, so a slow, failing
//! or panicking consumer only ever affects itself.

pub mod decision;
pub mod persistence;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

use crate::models::Annotation;
use crate::pipeline::Subscription;

pub use decision::{filter, DecisionConsumer, FilterVerdict, Suggestion};
pub use persistence::PersistenceConsumer;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

#[async_trait]
pub trait AnnotationHandler: Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn handle(&self, annotation: Arc<Annotation>) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub handled: u64,
    pub failed: u64,
    pub panicked: u64,
}

/// Reads the subscription in publish order until cancelled or the broadcaster goes
/// away. Each annotation is handled in a child task so a panic is contained to that
/// one annotation. The subscription is dropped on exit, which unsubscribes it.
pub async fn consumer_loop(
    handler: Arc<dyn AnnotationHandler>,
    mut subscription: Subscription<Arc<Annotation>>,
    cancel_token: CancellationToken,
) -> ConsumerStats {
    let mut stats = ConsumerStats::default();
    let name = handler.name().to_string();

    loop {
        let annotation = tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log_info!("{name} consumer shutting down");
                break;
            }
            next = subscription.recv() => match next {
                Some(annotation) => annotation,
                None => {
                    log_info!("{name} consumer: broadcaster closed");
                    break;
                }
            },
        };

        let task_handler = Arc::clone(&handler);
        let result = tokio::spawn(async move { task_handler.handle(annotation).await }).await;

        match result {
            Ok(Ok(())) => stats.handled += 1,
            Ok(Err(err)) => {
                stats.failed += 1;
                log_warn!("{name} consumer failed to handle annotation: {err:#}");
            }
            Err(join_err) => {
                stats.panicked += 1;
                log_error!("{name} consumer: {}", format_join_error(join_err));
            }
        }
    }

    stats
}

fn format_join_error(join_err: JoinError) -> String {
    if join_err.is_cancelled() {
        "handler task was cancelled".to_string()
    } else if join_err.is_panic() {
        let panic = join_err.into_panic();
        if let Some(msg) = panic.downcast_ref::<&str>() {
            format!("handler panicked: {msg}")
        } else if let Some(msg) = panic.downcast_ref::<String>() {
            format!("handler panicked: {msg}")
        } else {
            "handler panicked".to_string()
        }
    } else {
        join_err.to_string()
    }
}
