mod types;

pub use types::{MetricsSnapshot, SystemMetrics, TickMetrics, TickOutcomeKind};

use std::sync::Arc;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::sync::Mutex;

const MAX_RECENT_TICKS: usize = 20;

/// Per-tick pipeline metrics plus this process's CPU and memory.
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsState>>,
}

struct MetricsState {
    recent_ticks: Vec<TickMetrics>,
    tick_count: u64,
    empty_count: u64,
    published_count: u64,
    failed_count: u64,
    dropped_deliveries: u64,
    system: System,
    pid: Pid,
}

impl MetricsCollector {
    pub fn new() -> Self {
        let mut system = System::new();
        let pid = Pid::from_u32(std::process::id());

        // CPU usage is a delta between refreshes; take the baseline now.
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]));

        Self {
            inner: Arc::new(Mutex::new(MetricsState {
                recent_ticks: Vec::with_capacity(MAX_RECENT_TICKS),
                tick_count: 0,
                empty_count: 0,
                published_count: 0,
                failed_count: 0,
                dropped_deliveries: 0,
                system,
                pid,
            })),
        }
    }

    pub async fn record_tick(&self, metrics: TickMetrics) {
        let mut state = self.inner.lock().await;

        state.tick_count += 1;
        match metrics.outcome {
            TickOutcomeKind::Empty => state.empty_count += 1,
            TickOutcomeKind::Published => state.published_count += 1,
            TickOutcomeKind::Failed | TickOutcomeKind::TimedOut => state.failed_count += 1,
        }
        state.dropped_deliveries += metrics.dropped as u64;

        state.recent_ticks.push(metrics);
        if state.recent_ticks.len() > MAX_RECENT_TICKS {
            state.recent_ticks.remove(0);
        }
    }

    pub async fn get_snapshot(&self) -> MetricsSnapshot {
        let mut state = self.inner.lock().await;
        let pid = state.pid;

        state.system.refresh_processes(ProcessesToUpdate::Some(&[pid]));

        let system_metrics = match state.system.process(pid) {
            Some(process) => SystemMetrics {
                cpu_percent: process.cpu_usage(),
                memory_mb: process.memory() as f64 / 1024.0 / 1024.0,
            },
            None => SystemMetrics {
                cpu_percent: 0.0,
                memory_mb: 0.0,
            },
        };

        MetricsSnapshot {
            system: system_metrics,
            recent_ticks: state.recent_ticks.clone(),
            tick_count: state.tick_count,
            empty_count: state.empty_count,
            published_count: state.published_count,
            failed_count: state.failed_count,
            dropped_deliveries: state.dropped_deliveries,
        }
    }

    pub async fn reset(&self) {
        let mut state = self.inner.lock().await;
        let pid = state.pid;
        state.recent_ticks.clear();
        state.tick_count = 0;
        state.empty_count = 0;
        state.published_count = 0;
        state.failed_count = 0;
        state.dropped_deliveries = 0;
        state.system.refresh_processes(ProcessesToUpdate::Some(&[pid]));
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MetricsCollector {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn tick(outcome: TickOutcomeKind, dropped: usize) -> TickMetrics {
        TickMetrics {
            timestamp: Utc::now(),
            outcome,
            signal_count: 0,
            had_snapshot: false,
            annotate_ms: None,
            delivered: 0,
            dropped,
            total_ms: 0,
        }
    }

    #[tokio::test]
    async fn counts_outcomes_and_keeps_a_bounded_history() {
        let metrics = MetricsCollector::new();
        for _ in 0..25 {
            metrics.record_tick(tick(TickOutcomeKind::Empty, 0)).await;
        }
        metrics.record_tick(tick(TickOutcomeKind::Published, 2)).await;
        metrics.record_tick(tick(TickOutcomeKind::TimedOut, 0)).await;

        let snapshot = metrics.get_snapshot().await;
        assert_eq!(snapshot.tick_count, 27);
        assert_eq!(snapshot.empty_count, 25);
        assert_eq!(snapshot.published_count, 1);
        assert_eq!(snapshot.failed_count, 1);
        assert_eq!(snapshot.dropped_deliveries, 2);
        assert_eq!(snapshot.recent_ticks.len(), MAX_RECENT_TICKS);
        assert_eq!(
            snapshot.recent_ticks.last().map(|t| t.outcome),
            Some(TickOutcomeKind::TimedOut)
        );

        metrics.reset().await;
        assert_eq!(metrics.get_snapshot().await.tick_count, 0);
    }
}
