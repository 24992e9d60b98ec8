use std::sync::{Arc, Mutex, Weak};

use anyhow::{anyhow, bail, Context, Result};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::delivery::{DeliveryManager, DeliveryOutcome, FlushTrigger, Transport};
use crate::host::{PageEventSink, PageHost};
use crate::metrics::{DeliveryMetrics, MetricsSnapshot};
use crate::models::GUEST_VIEWER_ID;
use crate::sampling::{SampleBuffer, SamplerClock, SamplerState, TrackerStatus};
use crate::settings::TrackerSettings;
use crate::tracking::{SignalState, SignalTracker};
use crate::utils::sync::lock;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

struct RunningTasks {
    cancel_token: CancellationToken,
    clock: JoinHandle<()>,
    flush_loop: JoinHandle<()>,
}

struct TrackerInner {
    id: Uuid,
    entity_id: String,
    settings: TrackerSettings,
    signals: Arc<SignalTracker>,
    buffer: Arc<SampleBuffer>,
    clock: Arc<SamplerClock>,
    delivery: Arc<DeliveryManager>,
    tasks: Mutex<Option<RunningTasks>>,
    runtime: Handle,
}

/// Handle to one page view's behaviour tracking.
///
/// Lifecycle is `Idle -> Running -> Stopped`; `Stopped` is terminal. Clones
/// share the same tracker. Dropping the last clone of a running tracker halts
/// it and ships whatever is still buffered.
#[derive(Clone)]
pub struct TrackerHandle {
    inner: Arc<TrackerInner>,
}

impl TrackerHandle {
    /// Build an idle tracker. Must be called inside a tokio runtime.
    pub fn new(
        host: Arc<dyn PageHost>,
        transport: Arc<dyn Transport>,
        settings: TrackerSettings,
        entity_id: impl Into<String>,
        viewer_id: impl Into<String>,
    ) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|err| anyhow!("behaviour tracking needs a tokio runtime: {err}"))?;
        let settings = settings.validated()?;

        let entity_id = entity_id.into();
        let viewer_id = viewer_id.into();
        let viewer_id = if viewer_id.trim().is_empty() {
            GUEST_VIEWER_ID.to_string()
        } else {
            viewer_id
        };

        let signals = Arc::new(SignalTracker::new(host, settings.activity_grace()));
        let buffer = Arc::new(SampleBuffer::new());
        let clock = Arc::new(SamplerClock::new(
            Arc::clone(&signals),
            Arc::clone(&buffer),
            settings.target_element_id.clone(),
        ));
        let delivery = Arc::new(DeliveryManager::new(
            Arc::clone(&buffer),
            transport,
            entity_id.clone(),
            viewer_id,
            DeliveryMetrics::new(),
            runtime.clone(),
        ));

        Ok(Self {
            inner: Arc::new(TrackerInner {
                id: Uuid::new_v4(),
                entity_id,
                settings,
                signals,
                buffer,
                clock,
                delivery,
                tasks: Mutex::new(None),
                runtime,
            }),
        })
    }

    /// Attach listeners and start the sampler and flush timers.
    ///
    /// No-op while running; an error once stopped. If the host refuses the
    /// listeners the tracker stays idle. Concurrent callers are serialized:
    /// exactly one of them attaches.
    pub fn start(&self) -> Result<()> {
        let inner = &self.inner;
        let mut tasks = lock(&inner.tasks);
        match inner.clock.status() {
            TrackerStatus::Running => return Ok(()),
            TrackerStatus::Stopped => bail!("tracker {} was stopped and cannot restart", inner.id),
            TrackerStatus::Idle => {}
        }

        let sink: Arc<dyn PageEventSink> = Arc::new(TrackerEvents {
            inner: Arc::downgrade(inner),
        });
        inner
            .signals
            .start(sink)
            .with_context(|| format!("failed to start tracking {}", inner.entity_id))?;

        if !inner.clock.begin(Instant::now()) {
            inner.signals.stop();
            bail!("tracker {} is no longer idle", inner.id);
        }

        let _runtime = inner.runtime.enter();
        let cancel_token = CancellationToken::new();
        let clock = inner
            .clock
            .spawn(inner.settings.sample_period(), cancel_token.clone());
        let flush_loop = inner
            .delivery
            .spawn_periodic(inner.settings.flush_interval(), cancel_token.clone());

        *tasks = Some(RunningTasks {
            cancel_token,
            clock,
            flush_loop,
        });

        log_info!(
            "tracking {} as tracker {} every {}ms",
            inner.entity_id,
            inner.id,
            inner.settings.sample_period_ms
        );
        Ok(())
    }

    /// Synchronous teardown: listeners detached, timers cancelled, no
    /// further samples. Leaves the buffer alone. Idempotent.
    pub fn halt(&self) {
        self.inner.halt();
    }

    /// Halt, then make a final flush attempt.
    pub async fn stop(&self) -> Option<DeliveryOutcome> {
        self.inner.halt();
        self.inner.delivery.flush(FlushTrigger::Stop).await
    }

    /// Flush now without changing the tracker's status.
    pub async fn flush(&self) -> Option<DeliveryOutcome> {
        self.inner.delivery.flush(FlushTrigger::Manual).await
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn entity_id(&self) -> &str {
        &self.inner.entity_id
    }

    pub fn status(&self) -> TrackerStatus {
        self.inner.clock.status()
    }

    pub fn settings(&self) -> &TrackerSettings {
        &self.inner.settings
    }

    pub fn buffered_samples(&self) -> usize {
        self.inner.buffer.len()
    }

    pub fn sampler_state(&self) -> SamplerState {
        self.inner.clock.state()
    }

    pub fn signal_state(&self) -> SignalState {
        self.inner.signals.snapshot()
    }

    pub fn delivery_metrics(&self) -> MetricsSnapshot {
        self.inner.delivery.metrics().snapshot()
    }
}

impl TrackerInner {
    fn halt(&self) {
        let mut tasks = lock(&self.tasks);
        let was_running = self.clock.status() == TrackerStatus::Running;
        self.clock.stop();
        self.signals.stop();

        if let Some(running) = tasks.take() {
            running.cancel_token.cancel();
            running.clock.abort();
            // The flush loop sees the cancellation itself so an in-flight
            // fallback request is not cut short.
            drop(running.flush_loop);
        }
        drop(tasks);

        if was_running {
            log_info!(
                "tracker {} stopped after {}ms active",
                self.id,
                self.clock.state().active_ms()
            );
        }
    }
}

impl Drop for TrackerInner {
    fn drop(&mut self) {
        if self.clock.status() != TrackerStatus::Running {
            return;
        }
        self.halt();
        if !self.buffer.is_empty() {
            log_warn!(
                "tracker {} dropped while running, shipping {} buffered samples",
                self.id,
                self.buffer.len()
            );
        }
        self.delivery.dispatch(FlushTrigger::Stop);
    }
}

/// Routes host callbacks to the tracker without keeping it alive.
struct TrackerEvents {
    inner: Weak<TrackerInner>,
}

impl TrackerEvents {
    fn running(&self) -> Option<Arc<TrackerInner>> {
        self.inner
            .upgrade()
            .filter(|inner| inner.clock.status() == TrackerStatus::Running)
    }
}

impl PageEventSink for TrackerEvents {
    fn on_pointer_move(&self, page_x: f64, page_y: f64) {
        if let Some(inner) = self.running() {
            inner.signals.on_pointer_move(page_x, page_y);
        }
    }

    fn on_scroll(&self, scroll_y: f64) {
        if let Some(inner) = self.running() {
            inner.signals.on_scroll(scroll_y);
        }
    }

    fn on_visibility_change(&self, hidden: bool) {
        if !hidden {
            return;
        }
        if let Some(inner) = self.running() {
            inner.delivery.dispatch(FlushTrigger::Hidden);
        }
    }

    fn on_page_hide(&self) {
        if let Some(inner) = self.running() {
            inner.delivery.dispatch(FlushTrigger::PageHide);
        }
    }
}

/// Start tracking `entity_id` for `viewer_id`, sampling every `period_ms`.
///
/// An empty `viewer_id` is recorded as the guest viewer.
pub fn start_tracking(
    host: Arc<dyn PageHost>,
    transport: Arc<dyn Transport>,
    entity_id: impl Into<String>,
    viewer_id: impl Into<String>,
    period_ms: u64,
) -> Result<TrackerHandle> {
    let settings = TrackerSettings::default().with_sample_period_ms(period_ms);
    start_tracking_with(host, transport, settings, entity_id, viewer_id)
}

/// [`start_tracking`] with explicit settings.
pub fn start_tracking_with(
    host: Arc<dyn PageHost>,
    transport: Arc<dyn Transport>,
    settings: TrackerSettings,
    entity_id: impl Into<String>,
    viewer_id: impl Into<String>,
) -> Result<TrackerHandle> {
    let handle = TrackerHandle::new(host, transport, settings, entity_id, viewer_id)?;
    handle.start()?;
    Ok(handle)
}
