use serde::{Deserialize, Serialize};

/// One snapshot of derived interaction metrics, produced per active tick.
///
/// Field names on the wire match the behaviour index the backend writes to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Per-tracker sequence number, strictly increasing.
    pub seq: u64,
    /// Wall-clock time of the tick, epoch milliseconds.
    pub timestamp: i64,
    /// Active time accumulated since tracking started.
    #[serde(rename = "elapsedMs")]
    pub elapsed_active_ms: u64,
    #[serde(rename = "mouseX")]
    pub normalized_cursor_x: f64,
    #[serde(rename = "mouseY")]
    pub normalized_cursor_y: f64,
    #[serde(rename = "MMF_X")]
    pub normalized_pointer_travel_x: f64,
    #[serde(rename = "MMF_Y")]
    pub normalized_pointer_travel_y: f64,
    #[serde(rename = "MSF_Y")]
    pub normalized_scroll_travel: f64,
    /// Distance from the cursor to the reading target's centre; `-1` when
    /// the target is absent.
    #[serde(rename = "distTarget")]
    pub distance_to_target: f64,
    /// `1` on target, `1/d` off target, `0` when undefined.
    #[serde(rename = "baseline")]
    pub proximity_score: f64,
}

impl Sample {
    /// True when every numeric field is finite.
    pub fn is_finite(&self) -> bool {
        [
            self.normalized_cursor_x,
            self.normalized_cursor_y,
            self.normalized_pointer_travel_x,
            self.normalized_pointer_travel_y,
            self.normalized_scroll_travel,
            self.distance_to_target,
            self.proximity_score,
        ]
        .iter()
        .all(|value| value.is_finite())
    }
}
