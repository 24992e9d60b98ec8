//! In-memory page host and recording transport.
//!
//! Used by this crate's tests and available to embedders that want to drive
//! a tracker without a real document or network.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use tokio::sync::{watch, Notify};

use crate::delivery::{Transport, TransportFuture};
use crate::host::{ClientRect, HostError, PageEventSink, PageHost, Viewport};
use crate::models::{DeliveryPayload, Sample};
use crate::utils::sync::lock;

/// Sink that drops every event.
pub struct NullSink;

impl PageEventSink for NullSink {
    fn on_pointer_move(&self, _page_x: f64, _page_y: f64) {}
    fn on_scroll(&self, _scroll_y: f64) {}
    fn on_visibility_change(&self, _hidden: bool) {}
    fn on_page_hide(&self) {}
}

struct PageState {
    viewport: Viewport,
    hidden: bool,
    focused: bool,
    targets: HashMap<String, ClientRect>,
    sink: Option<Arc<dyn PageEventSink>>,
    attach_count: usize,
    detach_count: usize,
    fail_attach: bool,
    attach_delay: Option<Duration>,
    page_hide_hook: Option<Box<dyn FnOnce() + Send>>,
}

/// Scriptable stand-in for a browser document. Starts visible and focused.
pub struct FakePage {
    state: Mutex<PageState>,
}

impl FakePage {
    pub fn new(width: f64, height: f64) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(PageState {
                viewport: Viewport::new(width, height),
                hidden: false,
                focused: true,
                targets: HashMap::new(),
                sink: None,
                attach_count: 0,
                detach_count: 0,
                fail_attach: false,
                attach_delay: None,
                page_hide_hook: None,
            }),
        })
    }

    pub fn set_scroll(&self, scroll_x: f64, scroll_y: f64) {
        let mut state = lock(&self.state);
        state.viewport.scroll_x = scroll_x;
        state.viewport.scroll_y = scroll_y;
    }

    pub fn set_viewport_size(&self, width: f64, height: f64) {
        let mut state = lock(&self.state);
        state.viewport.width = width;
        state.viewport.height = height;
    }

    pub fn set_hidden(&self, hidden: bool) {
        lock(&self.state).hidden = hidden;
    }

    pub fn set_focus(&self, focused: bool) {
        lock(&self.state).focused = focused;
    }

    pub fn set_target(&self, id: &str, rect: Option<ClientRect>) {
        let mut state = lock(&self.state);
        match rect {
            Some(rect) => state.targets.insert(id.to_string(), rect),
            None => state.targets.remove(id),
        };
    }

    /// Make the next [`PageHost::attach`] fail.
    pub fn fail_attach(&self) {
        lock(&self.state).fail_attach = true;
    }

    /// Block the attaching thread for `delay` before registering, like a
    /// slow bridge would.
    pub fn set_attach_delay(&self, delay: Duration) {
        lock(&self.state).attach_delay = Some(delay);
    }

    /// Run `hook` once, right after the next page-hide callback returns and
    /// still inside the same dispatch.
    pub fn on_next_page_hide(&self, hook: impl FnOnce() + Send + 'static) {
        lock(&self.state).page_hide_hook = Some(Box::new(hook));
    }

    pub fn attach_count(&self) -> usize {
        lock(&self.state).attach_count
    }

    pub fn detach_count(&self) -> usize {
        lock(&self.state).detach_count
    }

    pub fn is_attached(&self) -> bool {
        lock(&self.state).sink.is_some()
    }

    pub fn pointer_move(&self, page_x: f64, page_y: f64) {
        if let Some(sink) = self.sink() {
            sink.on_pointer_move(page_x, page_y);
        }
    }

    /// Scroll the document and notify listeners.
    pub fn scroll_to(&self, scroll_y: f64) {
        lock(&self.state).viewport.scroll_y = scroll_y;
        if let Some(sink) = self.sink() {
            sink.on_scroll(scroll_y);
        }
    }

    /// Change visibility and notify listeners.
    pub fn change_visibility(&self, hidden: bool) {
        self.set_hidden(hidden);
        if let Some(sink) = self.sink() {
            sink.on_visibility_change(hidden);
        }
    }

    pub fn page_hide(&self) {
        if let Some(sink) = self.sink() {
            sink.on_page_hide();
        }
        let hook = lock(&self.state).page_hide_hook.take();
        if let Some(hook) = hook {
            hook();
        }
    }

    // Cloned out so callbacks never run under the page lock.
    fn sink(&self) -> Option<Arc<dyn PageEventSink>> {
        lock(&self.state).sink.clone()
    }
}

impl PageHost for FakePage {
    fn attach(&self, sink: Arc<dyn PageEventSink>) -> Result<(), HostError> {
        let delay = lock(&self.state).attach_delay;
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        let mut state = lock(&self.state);
        if state.fail_attach {
            state.fail_attach = false;
            return Err(HostError::Attach("listener registration rejected".into()));
        }
        if state.sink.is_some() {
            return Err(HostError::AlreadyAttached);
        }
        state.sink = Some(sink);
        state.attach_count += 1;
        Ok(())
    }

    fn detach(&self) {
        let mut state = lock(&self.state);
        if state.sink.take().is_some() {
            state.detach_count += 1;
        }
    }

    fn is_hidden(&self) -> bool {
        lock(&self.state).hidden
    }

    fn has_focus(&self) -> bool {
        lock(&self.state).focused
    }

    fn viewport(&self) -> Viewport {
        lock(&self.state).viewport
    }

    fn element_rect(&self, id: &str) -> Option<ClientRect> {
        lock(&self.state).targets.get(id).copied()
    }
}

#[derive(Default)]
struct TransportLog {
    beacon_calls: usize,
    keepalive_calls: usize,
    refuse_beacons: bool,
    fail_keepalives: bool,
}

/// Transport that records every payload it accepts.
pub struct RecordingTransport {
    log: Mutex<TransportLog>,
    delivered: Arc<Mutex<Vec<DeliveryPayload>>>,
    keepalive_started: Arc<Notify>,
    gate: watch::Sender<bool>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        let (gate, _) = watch::channel(false);
        Arc::new(Self {
            log: Mutex::new(TransportLog::default()),
            delivered: Arc::new(Mutex::new(Vec::new())),
            keepalive_started: Arc::new(Notify::new()),
            gate,
        })
    }

    pub fn refuse_beacons(&self, refuse: bool) {
        lock(&self.log).refuse_beacons = refuse;
    }

    pub fn fail_keepalives(&self, fail: bool) {
        lock(&self.log).fail_keepalives = fail;
    }

    /// Keepalive requests issued from now on wait for
    /// [`RecordingTransport::release_keepalives`].
    pub fn hold_keepalives(&self) {
        self.gate.send_replace(true);
    }

    pub fn release_keepalives(&self) {
        self.gate.send_replace(false);
    }

    /// Resolves once a keepalive request has been issued.
    pub async fn wait_for_keepalive(&self) {
        self.keepalive_started.notified().await;
    }

    pub fn beacon_calls(&self) -> usize {
        lock(&self.log).beacon_calls
    }

    pub fn keepalive_calls(&self) -> usize {
        lock(&self.log).keepalive_calls
    }

    pub fn delivered_payloads(&self) -> Vec<DeliveryPayload> {
        lock(&self.delivered).clone()
    }

    /// Every delivered sample sequence number, in delivery order.
    pub fn delivered_seqs(&self) -> Vec<u64> {
        lock(&self.delivered)
            .iter()
            .flat_map(|payload| payload.samples.iter().map(|sample| sample.seq))
            .collect()
    }
}

impl Transport for RecordingTransport {
    fn send_beacon(&self, body: &[u8]) -> bool {
        let refuse = {
            let mut log = lock(&self.log);
            log.beacon_calls += 1;
            log.refuse_beacons
        };
        if refuse {
            return false;
        }
        match serde_json::from_slice(body) {
            Ok(payload) => {
                lock(&self.delivered).push(payload);
                true
            }
            Err(_) => false,
        }
    }

    fn send_keepalive(&self, body: Vec<u8>) -> TransportFuture {
        let fail = {
            let mut log = lock(&self.log);
            log.keepalive_calls += 1;
            log.fail_keepalives
        };
        let delivered = Arc::clone(&self.delivered);
        let mut gate = self.gate.subscribe();
        self.keepalive_started.notify_one();

        Box::pin(async move {
            loop {
                let held = *gate.borrow_and_update();
                if !held || gate.changed().await.is_err() {
                    break;
                }
            }
            if fail {
                return Err(anyhow!("keepalive request failed"));
            }
            let payload: DeliveryPayload = serde_json::from_slice(&body)?;
            lock(&delivered).push(payload);
            Ok(())
        })
    }
}

/// A finite sample carrying only a sequence number.
pub fn sample_with_seq(seq: u64) -> Sample {
    Sample {
        seq,
        timestamp: 0,
        elapsed_active_ms: seq * 100,
        normalized_cursor_x: 0.0,
        normalized_cursor_y: 0.0,
        normalized_pointer_travel_x: 0.0,
        normalized_pointer_travel_y: 0.0,
        normalized_scroll_travel: 0.0,
        distance_to_target: -1.0,
        proximity_score: 0.0,
    }
}
