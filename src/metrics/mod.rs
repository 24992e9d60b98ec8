mod types;

pub use types::{FlushRecord, MetricsSnapshot};

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::Utc;

use crate::delivery::{DeliveryOutcome, FlushTrigger};
use crate::utils::sync::lock;

const MAX_RECENT_FLUSHES: usize = 20;

/// Running delivery diagnostics for one tracker. Cheap to clone; clones
/// share the same counters.
#[derive(Clone, Default)]
pub struct DeliveryMetrics {
    inner: Arc<Mutex<MetricsState>>,
}

#[derive(Default)]
struct MetricsState {
    recent_flushes: VecDeque<FlushRecord>,
    delivered_primary: u64,
    delivered_fallback: u64,
    dropped: u64,
    samples_delivered: u64,
    samples_dropped: u64,
}

impl DeliveryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_flush(
        &self,
        trigger: FlushTrigger,
        outcome: DeliveryOutcome,
        sample_count: usize,
        payload_bytes: usize,
    ) {
        let mut state = lock(&self.inner);

        match outcome {
            DeliveryOutcome::DeliveredPrimary => state.delivered_primary += 1,
            DeliveryOutcome::DeliveredFallback => state.delivered_fallback += 1,
            DeliveryOutcome::Dropped => state.dropped += 1,
        }
        if outcome.is_delivered() {
            state.samples_delivered += sample_count as u64;
        } else {
            state.samples_dropped += sample_count as u64;
        }

        state.recent_flushes.push_back(FlushRecord {
            timestamp: Utc::now(),
            trigger,
            outcome,
            sample_count,
            payload_bytes,
        });
        while state.recent_flushes.len() > MAX_RECENT_FLUSHES {
            state.recent_flushes.pop_front();
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let state = lock(&self.inner);
        MetricsSnapshot {
            recent_flushes: state.recent_flushes.iter().cloned().collect(),
            delivered_primary: state.delivered_primary,
            delivered_fallback: state.delivered_fallback,
            dropped: state.dropped,
            samples_delivered: state.samples_delivered,
            samples_dropped: state.samples_dropped,
        }
    }

    pub fn reset(&self) {
        *lock(&self.inner) = MetricsState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_follow_outcomes() {
        let metrics = DeliveryMetrics::new();
        metrics.record_flush(FlushTrigger::Periodic, DeliveryOutcome::DeliveredPrimary, 10, 900);
        metrics.record_flush(FlushTrigger::Hidden, DeliveryOutcome::DeliveredFallback, 4, 400);
        metrics.record_flush(FlushTrigger::Stop, DeliveryOutcome::Dropped, 3, 300);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.flush_count(), 3);
        assert_eq!(snapshot.samples_delivered, 14);
        assert_eq!(snapshot.samples_dropped, 3);
        assert_eq!(snapshot.recent_flushes[2].trigger, FlushTrigger::Stop);
    }

    #[test]
    fn recent_history_is_bounded() {
        let metrics = DeliveryMetrics::new();
        for count in 0..(MAX_RECENT_FLUSHES + 5) {
            metrics.record_flush(FlushTrigger::Manual, DeliveryOutcome::DeliveredPrimary, count, 0);
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.recent_flushes.len(), MAX_RECENT_FLUSHES);
        assert_eq!(snapshot.recent_flushes[0].sample_count, 5);
        assert_eq!(snapshot.delivered_primary, (MAX_RECENT_FLUSHES + 5) as u64);

        metrics.reset();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }
}
