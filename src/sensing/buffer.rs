use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::models::{ActivitySignal, Batch, ScreenSnapshot};

#[derive(Default)]
struct BufferState {
    signals: String,
    signal_count: usize,
    snapshot: Option<ScreenSnapshot>,
    snapshot_updated_at: Option<DateTime<Utc>>,
}

/// Accumulates activity signals and the latest screen snapshot between ticks.
///
/// Many producers, one drainer. Every operation is a short critical section on a
/// single mutex, so a drain never observes a half-applied update and a signal
/// appended during a drain lands in exactly one batch.
///
/// Draining clears the signals but keeps the snapshot as the baseline for the next
/// batch; only `update_snapshot` replaces it.
#[derive(Clone, Default)]
pub struct EventBuffer {
    inner: Arc<Mutex<BufferState>>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BufferState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn append_signal(&self, signal: impl Into<ActivitySignal>) {
        let marker = signal.into().marker();
        let mut state = self.lock();
        state.signals.push_str(&marker);
        state.signal_count += 1;
    }

    pub fn update_snapshot(&self, snapshot: ScreenSnapshot) {
        let mut state = self.lock();
        state.snapshot = Some(snapshot);
        state.snapshot_updated_at = Some(Utc::now());
    }

    pub fn has_pending_data(&self) -> bool {
        let state = self.lock();
        state.signal_count > 0 || state.snapshot.is_some()
    }

    /// When the held snapshot was last replaced, if ever.
    pub fn snapshot_updated_at(&self) -> Option<DateTime<Utc>> {
        self.lock().snapshot_updated_at
    }

    pub fn drain_and_clear(&self) -> Option<Batch> {
        let mut state = self.lock();
        if state.signal_count == 0 && state.snapshot.is_none() {
            return None;
        }

        let signals = std::mem::take(&mut state.signals);
        let signal_count = std::mem::take(&mut state.signal_count);

        Some(Batch {
            signals,
            signal_count,
            snapshot: state.snapshot.clone(),
            drained_at: Utc::now(),
        })
    }
}
