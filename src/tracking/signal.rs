use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::time::{Duration, Instant};

use crate::host::{HostError, PageEventSink, PageHost};
use crate::sampling::proximity::finite_or_zero;
use crate::utils::sync::lock;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = false;

use crate::log_debug;

pub const DEFAULT_ACTIVITY_GRACE: Duration = Duration::from_millis(1000);

/// Live input state. Cumulative fields only ever grow during a session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalState {
    pub cursor_x: f64,
    pub cursor_y: f64,
    pub cumulative_pointer_delta_x: f64,
    pub cumulative_pointer_delta_y: f64,
    pub cumulative_scroll_delta: f64,
    pub last_known_scroll_position: f64,
    has_pointer: bool,
    last_activity: Option<Instant>,
}

impl SignalState {
    fn record_pointer(&mut self, x: f64, y: f64) {
        if self.has_pointer {
            self.cumulative_pointer_delta_x += (x - self.cursor_x).abs();
            self.cumulative_pointer_delta_y += (y - self.cursor_y).abs();
        }
        self.cursor_x = x;
        self.cursor_y = y;
        self.has_pointer = true;
    }

    fn record_scroll(&mut self, scroll_y: f64) {
        self.cumulative_scroll_delta += (scroll_y - self.last_known_scroll_position).abs();
        self.last_known_scroll_position = scroll_y;
    }
}

/// Tracks pointer and scroll input while the page is active.
///
/// Does no sampling or I/O of its own; the sampler clock reads
/// [`SignalTracker::snapshot`] on every tick.
pub struct SignalTracker {
    host: Arc<dyn PageHost>,
    state: Mutex<SignalState>,
    activity_grace: Duration,
    listening: AtomicBool,
}

impl SignalTracker {
    pub fn new(host: Arc<dyn PageHost>, activity_grace: Duration) -> Self {
        Self {
            host,
            state: Mutex::new(SignalState::default()),
            activity_grace,
            listening: AtomicBool::new(false),
        }
    }

    /// Attach page listeners, routing them to `sink`.
    ///
    /// A second call while already listening, or while another caller is
    /// attaching, does nothing.
    pub fn start(&self, sink: Arc<dyn PageEventSink>) -> Result<(), HostError> {
        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }

        {
            let mut state = lock(&self.state);
            state.last_known_scroll_position = finite_or_zero(self.host.viewport().scroll_y);
        }

        if let Err(err) = self.host.attach(sink) {
            self.listening.store(false, Ordering::SeqCst);
            return Err(err);
        }
        Ok(())
    }

    /// Detach listeners. State stays frozen at its last value.
    pub fn stop(&self) {
        if self.listening.swap(false, Ordering::SeqCst) {
            self.host.detach();
        }
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    /// Page is visible and either focused or recently interacted with.
    pub fn is_active(&self) -> bool {
        if self.host.is_hidden() {
            return false;
        }
        if self.host.has_focus() {
            return true;
        }
        let last_activity = lock(&self.state).last_activity;
        last_activity
            .map(|at| at.elapsed() <= self.activity_grace)
            .unwrap_or(false)
    }

    pub fn on_pointer_move(&self, page_x: f64, page_y: f64) {
        if !page_x.is_finite() || !page_y.is_finite() {
            return;
        }
        if !self.is_listening() || !self.is_active() {
            return;
        }
        let mut state = lock(&self.state);
        state.record_pointer(page_x, page_y);
        state.last_activity = Some(Instant::now());
    }

    pub fn on_scroll(&self, scroll_y: f64) {
        if !scroll_y.is_finite() {
            return;
        }
        if !self.is_listening() || !self.is_active() {
            return;
        }
        let mut state = lock(&self.state);
        state.record_scroll(scroll_y);
        state.last_activity = Some(Instant::now());
        log_debug!("scroll to {scroll_y}, travel {}", state.cumulative_scroll_delta);
    }

    pub fn snapshot(&self) -> SignalState {
        lock(&self.state).clone()
    }

    pub(crate) fn host(&self) -> &Arc<dyn PageHost> {
        &self.host
    }
}
