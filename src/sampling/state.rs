use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum TrackerStatus {
    #[default]
    Idle,
    Running,
    Stopped,
}

/// Sequence number and active time assigned to one active tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickStamp {
    pub seq: u64,
    pub elapsed_active_ms: u64,
}

/// Clock bookkeeping: lifecycle status, accumulated active time and the
/// next sequence number.
#[derive(Debug, Clone, Default)]
pub struct SamplerState {
    pub status: TrackerStatus,
    pub started_at: Option<DateTime<Utc>>,
    active: Duration,
    next_seq: u64,
    last_tick: Option<Instant>,
}

impl SamplerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move `Idle -> Running`. Returns false from any other status.
    pub fn begin(&mut self, now: Instant) -> bool {
        if self.status != TrackerStatus::Idle {
            return false;
        }
        self.status = TrackerStatus::Running;
        self.started_at = Some(Utc::now());
        self.last_tick = Some(now);
        true
    }

    /// Account for the time since the previous tick.
    ///
    /// Elapsed time only counts as active when `active`; an inactive tick
    /// still moves the reference point so idle time is never credited later.
    /// Time is kept at full precision and only truncated to milliseconds in
    /// the returned stamp.
    pub fn record_tick(&mut self, now: Instant, active: bool) -> Option<TickStamp> {
        if self.status != TrackerStatus::Running {
            return None;
        }

        let previous = self.last_tick.unwrap_or(now);
        let elapsed = now.saturating_duration_since(previous);
        self.last_tick = Some(now);

        if !active {
            return None;
        }

        self.active = self.active.saturating_add(elapsed);
        let seq = self.next_seq;
        self.next_seq += 1;
        Some(TickStamp {
            seq,
            elapsed_active_ms: self.active_ms(),
        })
    }

    /// Terminal. Calling it again is harmless.
    pub fn stop(&mut self) {
        self.status = TrackerStatus::Stopped;
        self.last_tick = None;
    }

    /// Accumulated active time in whole milliseconds.
    pub fn active_ms(&self) -> u64 {
        self.active.as_millis() as u64
    }
}
