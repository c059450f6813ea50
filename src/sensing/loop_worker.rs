use std::sync::Arc;

use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::buffer::EventBuffer;
use super::capture::ScreenCapture;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Producer loop: keeps the buffer's snapshot slot fed with the latest frame.
pub async fn capture_loop(
    capture: Arc<dyn ScreenCapture>,
    buffer: EventBuffer,
    interval: Duration,
    capture_timeout: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match tokio::time::timeout(capture_timeout, capture.capture_snapshot()).await {
                    Ok(Some(snapshot)) => {
                        log_debug!("snapshot updated: {} / {}", snapshot.app, snapshot.window_title);
                        buffer.update_snapshot(snapshot);
                    }
                    Ok(None) => {}
                    Err(_) => log_warn!("screen capture timeout (> {}ms)", capture_timeout.as_millis()),
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("capture loop shutting down");
                break;
            }
        }
    }
}
