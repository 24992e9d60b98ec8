use serde::{Deserialize, Serialize};

use super::Sample;

/// Viewer id used when the page has no signed-in user.
pub const GUEST_VIEWER_ID: &str = "guest";

/// Body POSTed to the behaviour endpoint on every flush.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryPayload {
    pub entity_id: String,
    pub viewer_id: String,
    /// Epoch milliseconds at which the buffer was drained.
    pub flush_timestamp: i64,
    pub sample_count: usize,
    pub samples: Vec<Sample>,
}

impl DeliveryPayload {
    pub fn new(
        entity_id: impl Into<String>,
        viewer_id: impl Into<String>,
        flush_timestamp: i64,
        samples: Vec<Sample>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            viewer_id: viewer_id.into(),
            flush_timestamp,
            sample_count: samples.len(),
            samples,
        }
    }

    pub fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}
