use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::models::Sample;
use crate::tracking::SignalTracker;
use crate::utils::sync::lock;

use super::proximity::{self, normalize};
use super::{SampleBuffer, SamplerState, TrackerStatus};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = false;

use crate::{log_debug, log_info};

pub const DEFAULT_SAMPLE_PERIOD: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A sample was appended to the buffer.
    Sampled,
    /// The page was inactive; nothing was appended.
    Idle,
    /// The clock is not running.
    Halted,
}

/// Fixed-period sampler turning signal state into buffered [`Sample`]s.
pub struct SamplerClock {
    signals: Arc<SignalTracker>,
    buffer: Arc<SampleBuffer>,
    state: Mutex<SamplerState>,
    target_element_id: String,
}

impl SamplerClock {
    pub fn new(
        signals: Arc<SignalTracker>,
        buffer: Arc<SampleBuffer>,
        target_element_id: impl Into<String>,
    ) -> Self {
        Self {
            signals,
            buffer,
            state: Mutex::new(SamplerState::new()),
            target_element_id: target_element_id.into(),
        }
    }

    pub fn status(&self) -> TrackerStatus {
        lock(&self.state).status
    }

    pub fn state(&self) -> SamplerState {
        lock(&self.state).clone()
    }

    /// Mark the clock running with `now` as the first reference point.
    pub fn begin(&self, now: Instant) -> bool {
        lock(&self.state).begin(now)
    }

    /// Produce at most one sample for the tick at `now`.
    ///
    /// The state lock is held for the whole tick, so once [`SamplerClock::stop`]
    /// returns no further sample can be appended.
    pub fn tick(&self, now: Instant) -> TickOutcome {
        let mut state = lock(&self.state);
        if state.status != TrackerStatus::Running {
            return TickOutcome::Halted;
        }

        let active = self.signals.is_active();
        let Some(stamp) = state.record_tick(now, active) else {
            log_debug!("tick skipped, page inactive");
            return TickOutcome::Idle;
        };

        let signal = self.signals.snapshot();
        let host = self.signals.host();
        let viewport = host.viewport();
        let width = viewport.width;
        let height = viewport.height;
        let scroll_x = proximity::finite_or_zero(viewport.scroll_x);
        let scroll_y = proximity::finite_or_zero(viewport.scroll_y);

        // Looked up every tick; the article body may render after tracking starts.
        let target = host.element_rect(&self.target_element_id);
        let reading = proximity::measure(signal.cursor_x, signal.cursor_y, target, &viewport);

        let sample = Sample {
            seq: stamp.seq,
            timestamp: Utc::now().timestamp_millis(),
            elapsed_active_ms: stamp.elapsed_active_ms,
            normalized_cursor_x: normalize(signal.cursor_x - scroll_x, width),
            normalized_cursor_y: normalize(signal.cursor_y - scroll_y, height),
            normalized_pointer_travel_x: normalize(signal.cumulative_pointer_delta_x, width),
            normalized_pointer_travel_y: normalize(signal.cumulative_pointer_delta_y, height),
            normalized_scroll_travel: normalize(signal.cumulative_scroll_delta, height),
            distance_to_target: reading.distance,
            proximity_score: reading.proximity,
        };

        self.buffer.push(sample);
        TickOutcome::Sampled
    }

    /// Cancel further ticks. The buffer is left untouched.
    pub fn stop(&self) {
        lock(&self.state).stop();
    }

    /// Run [`SamplerClock::tick`] every `period` until `cancel_token` fires or
    /// the clock is stopped.
    pub fn spawn(self: &Arc<Self>, period: Duration, cancel_token: CancellationToken) -> JoinHandle<()> {
        let clock = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = cancel_token.cancelled() => {
                        log_info!("sampler clock shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        if clock.tick(Instant::now()) == TickOutcome::Halted {
                            break;
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ClientRect;
    use crate::sampling::ABSENT_TARGET_DISTANCE;
    use crate::testing::{FakePage, NullSink};
    use crate::tracking::DEFAULT_ACTIVITY_GRACE;

    struct Rig {
        page: Arc<FakePage>,
        signals: Arc<SignalTracker>,
        buffer: Arc<SampleBuffer>,
        clock: Arc<SamplerClock>,
        start: Instant,
    }

    fn rig() -> Rig {
        let page = FakePage::new(1000.0, 800.0);
        let signals = Arc::new(SignalTracker::new(page.clone(), DEFAULT_ACTIVITY_GRACE));
        signals.start(Arc::new(NullSink)).unwrap();
        let buffer = Arc::new(SampleBuffer::new());
        let clock = Arc::new(SamplerClock::new(signals.clone(), buffer.clone(), "viewBody"));
        let start = Instant::now();
        assert!(clock.begin(start));
        Rig {
            page,
            signals,
            buffer,
            clock,
            start,
        }
    }

    fn at(rig: &Rig, ms: u64) -> Instant {
        rig.start + Duration::from_millis(ms)
    }

    #[test]
    fn pointer_travel_is_normalized_by_viewport() {
        let rig = rig();
        rig.signals.on_pointer_move(0.0, 0.0);
        rig.signals.on_pointer_move(50.0, 30.0);

        assert_eq!(rig.clock.tick(at(&rig, 100)), TickOutcome::Sampled);

        let samples = rig.buffer.drain();
        let sample = &samples[0];
        assert_eq!(sample.seq, 0);
        assert_eq!(sample.elapsed_active_ms, 100);
        assert_eq!(sample.normalized_pointer_travel_x, 50.0 / 1000.0);
        assert_eq!(sample.normalized_pointer_travel_y, 30.0 / 800.0);
        assert_eq!(sample.normalized_cursor_x, 50.0 / 1000.0);
        assert_eq!(sample.normalized_cursor_y, 30.0 / 800.0);
    }

    #[test]
    fn cursor_is_normalized_relative_to_scroll() {
        let rig = rig();
        rig.page.set_scroll(0.0, 400.0);
        rig.signals.on_pointer_move(500.0, 800.0);
        rig.signals.on_scroll(400.0);

        rig.clock.tick(at(&rig, 100));
        let sample = rig.buffer.drain().remove(0);
        assert_eq!(sample.normalized_cursor_x, 0.5);
        assert_eq!(sample.normalized_cursor_y, 0.5);
        assert_eq!(sample.normalized_scroll_travel, 0.5);
    }

    #[test]
    fn inactive_ticks_append_nothing() {
        let rig = rig();
        rig.page.set_hidden(true);
        for ms in (100..=1000).step_by(100) {
            rig.signals.on_pointer_move(ms as f64, 0.0);
            assert_eq!(rig.clock.tick(at(&rig, ms)), TickOutcome::Idle);
        }

        assert!(rig.buffer.is_empty());
        assert_eq!(rig.clock.state().active_ms(), 0);
    }

    #[test]
    fn target_is_looked_up_each_tick() {
        let rig = rig();
        rig.signals.on_pointer_move(700.0, 200.0);

        rig.clock.tick(at(&rig, 100));
        rig.page
            .set_target("viewBody", Some(ClientRect::new(100.0, 100.0, 200.0, 200.0)));
        rig.clock.tick(at(&rig, 200));

        let samples = rig.buffer.drain();
        assert_eq!(samples[0].distance_to_target, ABSENT_TARGET_DISTANCE);
        assert_eq!(samples[0].proximity_score, 0.0);
        assert_eq!(samples[1].distance_to_target, 500.0);
        assert_eq!(samples[1].proximity_score, 0.002);
    }

    #[test]
    fn zero_viewport_emits_zeros() {
        let rig = rig();
        rig.page.set_viewport_size(0.0, 0.0);
        rig.signals.on_pointer_move(0.0, 0.0);
        rig.signals.on_pointer_move(10.0, 10.0);

        rig.clock.tick(at(&rig, 100));
        let sample = rig.buffer.drain().remove(0);
        assert!(sample.is_finite());
        assert_eq!(sample.normalized_cursor_x, 0.0);
        assert_eq!(sample.normalized_pointer_travel_y, 0.0);
    }

    #[test]
    fn stop_halts_sampling_without_clearing_buffer() {
        let rig = rig();
        rig.clock.tick(at(&rig, 100));
        rig.clock.stop();

        assert_eq!(rig.clock.tick(at(&rig, 200)), TickOutcome::Halted);
        assert_eq!(rig.buffer.len(), 1);
        assert_eq!(rig.clock.status(), TrackerStatus::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_clock_ticks_on_period() {
        let page = FakePage::new(1000.0, 800.0);
        let signals = Arc::new(SignalTracker::new(page.clone(), DEFAULT_ACTIVITY_GRACE));
        signals.start(Arc::new(NullSink)).unwrap();
        let buffer = Arc::new(SampleBuffer::new());
        let clock = Arc::new(SamplerClock::new(signals, buffer.clone(), "viewBody"));
        clock.begin(Instant::now());

        let cancel = CancellationToken::new();
        let handle = clock.spawn(Duration::from_millis(100), cancel.clone());

        time::sleep(Duration::from_millis(550)).await;
        cancel.cancel();
        handle.await.unwrap();

        let samples = buffer.drain();
        assert_eq!(samples.len(), 5);
        let seqs: Vec<u64> = samples.iter().map(|s| s.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
        assert_eq!(samples[4].elapsed_active_ms, 500);
    }
}
