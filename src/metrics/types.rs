use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::delivery::{DeliveryOutcome, FlushTrigger};

/// One flush attempt, as seen by the delivery manager.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlushRecord {
    pub timestamp: DateTime<Utc>,
    pub trigger: FlushTrigger,
    pub outcome: DeliveryOutcome,
    pub sample_count: usize,
    pub payload_bytes: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub recent_flushes: Vec<FlushRecord>,
    pub delivered_primary: u64,
    pub delivered_fallback: u64,
    pub dropped: u64,
    pub samples_delivered: u64,
    pub samples_dropped: u64,
}

impl MetricsSnapshot {
    pub fn flush_count(&self) -> u64 {
        self.delivered_primary + self.delivered_fallback + self.dropped
    }
}
