use std::sync::Arc;

use chrono::Utc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::metrics::DeliveryMetrics;
use crate::models::DeliveryPayload;
use crate::sampling::SampleBuffer;

use super::loop_worker::flush_loop;
use super::transport::{DeliveryOutcome, FlushTrigger, Transport};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_warn};

pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(10);

enum FirstAttempt {
    Settled(DeliveryOutcome),
    NeedsFallback(Vec<u8>),
}

/// Drains the sample buffer and ships it, beacon first, keepalive second.
///
/// Delivery is at most once: a batch that both transports refuse is logged
/// and discarded, never put back in the buffer.
pub struct DeliveryManager {
    buffer: Arc<SampleBuffer>,
    transport: Arc<dyn Transport>,
    entity_id: String,
    viewer_id: String,
    metrics: DeliveryMetrics,
    runtime: Handle,
}

impl DeliveryManager {
    pub fn new(
        buffer: Arc<SampleBuffer>,
        transport: Arc<dyn Transport>,
        entity_id: impl Into<String>,
        viewer_id: impl Into<String>,
        metrics: DeliveryMetrics,
        runtime: Handle,
    ) -> Self {
        Self {
            buffer,
            transport,
            entity_id: entity_id.into(),
            viewer_id: viewer_id.into(),
            metrics,
            runtime,
        }
    }

    pub fn metrics(&self) -> &DeliveryMetrics {
        &self.metrics
    }

    /// Swap the buffer out and wrap it in a payload. `None` when empty.
    pub fn take_payload(&self) -> Option<DeliveryPayload> {
        let samples = self.buffer.drain();
        if samples.is_empty() {
            return None;
        }
        Some(DeliveryPayload::new(
            self.entity_id.as_str(),
            self.viewer_id.as_str(),
            Utc::now().timestamp_millis(),
            samples,
        ))
    }

    /// Drain and deliver, waiting for the fallback request if the beacon is
    /// refused. Returns `None` when there was nothing to send.
    pub async fn flush(&self, trigger: FlushTrigger) -> Option<DeliveryOutcome> {
        // Swap before the first await so concurrent ticks land in the next batch.
        let payload = self.take_payload()?;
        let sample_count = payload.sample_count;

        let outcome = match self.attempt_primary(&payload, trigger) {
            FirstAttempt::Settled(outcome) => outcome,
            FirstAttempt::NeedsFallback(body) => {
                send_fallback(
                    Arc::clone(&self.transport),
                    self.metrics.clone(),
                    trigger,
                    sample_count,
                    body,
                )
                .await
            }
        };
        Some(outcome)
    }

    /// Lifecycle-path flush for synchronous callbacks.
    ///
    /// The swap and the beacon attempt happen before this returns; only the
    /// fallback request is left running on the runtime.
    pub fn dispatch(&self, trigger: FlushTrigger) {
        let Some(payload) = self.take_payload() else {
            return;
        };
        let sample_count = payload.sample_count;

        if let FirstAttempt::NeedsFallback(body) = self.attempt_primary(&payload, trigger) {
            self.runtime.spawn(send_fallback(
                Arc::clone(&self.transport),
                self.metrics.clone(),
                trigger,
                sample_count,
                body,
            ));
        }
    }

    /// Flush every `interval` until `cancel_token` fires.
    pub fn spawn_periodic(self: &Arc<Self>, interval: Duration, cancel_token: CancellationToken) -> JoinHandle<()> {
        self.runtime
            .spawn(flush_loop(Arc::clone(self), interval, cancel_token))
    }

    fn attempt_primary(&self, payload: &DeliveryPayload, trigger: FlushTrigger) -> FirstAttempt {
        let body = match payload.to_json_bytes() {
            Ok(body) => body,
            Err(err) => {
                log_error!(
                    "failed to serialize {} samples for {}: {err}",
                    payload.sample_count,
                    payload.entity_id
                );
                self.metrics
                    .record_flush(trigger, DeliveryOutcome::Dropped, payload.sample_count, 0);
                return FirstAttempt::Settled(DeliveryOutcome::Dropped);
            }
        };

        if self.transport.send_beacon(&body) {
            log_debug!(
                "{} flush: beacon accepted {} samples ({} bytes)",
                trigger.as_str(),
                payload.sample_count,
                body.len()
            );
            self.metrics.record_flush(
                trigger,
                DeliveryOutcome::DeliveredPrimary,
                payload.sample_count,
                body.len(),
            );
            FirstAttempt::Settled(DeliveryOutcome::DeliveredPrimary)
        } else {
            log_debug!("{} flush: beacon refused, falling back", trigger.as_str());
            FirstAttempt::NeedsFallback(body)
        }
    }
}

async fn send_fallback(
    transport: Arc<dyn Transport>,
    metrics: DeliveryMetrics,
    trigger: FlushTrigger,
    sample_count: usize,
    body: Vec<u8>,
) -> DeliveryOutcome {
    let payload_bytes = body.len();
    let outcome = match transport.send_keepalive(body).await {
        Ok(()) => DeliveryOutcome::DeliveredFallback,
        Err(err) => {
            log_warn!(
                "{} flush: dropping {sample_count} samples after fallback failed: {err:#}",
                trigger.as_str()
            );
            DeliveryOutcome::Dropped
        }
    };
    metrics.record_flush(trigger, outcome, sample_count, payload_bytes);
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_with_seq, RecordingTransport};
    use pretty_assertions::assert_eq;

    fn manager(transport: Arc<RecordingTransport>) -> (Arc<SampleBuffer>, Arc<DeliveryManager>) {
        let buffer = Arc::new(SampleBuffer::new());
        let manager = Arc::new(DeliveryManager::new(
            buffer.clone(),
            transport,
            "news-42",
            "guest",
            DeliveryMetrics::new(),
            Handle::current(),
        ));
        (buffer, manager)
    }

    fn fill(buffer: &SampleBuffer, seqs: std::ops::Range<u64>) {
        for seq in seqs {
            buffer.push(sample_with_seq(seq));
        }
    }

    #[tokio::test]
    async fn empty_buffer_is_a_no_op() {
        let transport = RecordingTransport::new();
        let (_buffer, manager) = manager(transport.clone());

        assert_eq!(manager.flush(FlushTrigger::Manual).await, None);
        assert_eq!(transport.beacon_calls(), 0);
        assert_eq!(transport.keepalive_calls(), 0);
    }

    #[tokio::test]
    async fn beacon_success_is_primary_delivery() {
        let transport = RecordingTransport::new();
        let (buffer, manager) = manager(transport.clone());
        fill(&buffer, 0..4);

        let outcome = manager.flush(FlushTrigger::Periodic).await;

        assert_eq!(outcome, Some(DeliveryOutcome::DeliveredPrimary));
        assert!(buffer.is_empty());
        let sent = transport.delivered_payloads();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].entity_id, "news-42");
        assert_eq!(sent[0].viewer_id, "guest");
        assert_eq!(sent[0].sample_count, 4);
        assert_eq!(transport.keepalive_calls(), 0);
    }

    #[tokio::test]
    async fn refused_beacon_falls_back_once() {
        let transport = RecordingTransport::new();
        transport.refuse_beacons(true);
        let (buffer, manager) = manager(transport.clone());
        fill(&buffer, 0..3);

        let outcome = manager.flush(FlushTrigger::Manual).await;

        assert_eq!(outcome, Some(DeliveryOutcome::DeliveredFallback));
        assert!(buffer.is_empty());
        assert_eq!(transport.keepalive_calls(), 1);
        let sent = transport.delivered_payloads();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].sample_count, 3);

        let snapshot = manager.metrics().snapshot();
        assert_eq!(snapshot.delivered_fallback, 1);
        assert_eq!(snapshot.samples_delivered, 3);
    }

    #[tokio::test]
    async fn double_failure_drops_without_requeue() {
        let transport = RecordingTransport::new();
        transport.refuse_beacons(true);
        transport.fail_keepalives(true);
        let (buffer, manager) = manager(transport.clone());
        fill(&buffer, 0..5);

        let outcome = manager.flush(FlushTrigger::Manual).await;

        assert_eq!(outcome, Some(DeliveryOutcome::Dropped));
        assert!(buffer.is_empty());
        assert!(transport.delivered_payloads().is_empty());
        assert_eq!(manager.metrics().snapshot().samples_dropped, 5);
        assert_eq!(manager.flush(FlushTrigger::Manual).await, None);
    }

    #[tokio::test]
    async fn consecutive_flushes_never_overlap() {
        let transport = RecordingTransport::new();
        let (buffer, manager) = manager(transport.clone());

        fill(&buffer, 0..3);
        manager.flush(FlushTrigger::Periodic).await;
        fill(&buffer, 3..7);
        manager.flush(FlushTrigger::Periodic).await;

        let seqs: Vec<u64> = transport
            .delivered_payloads()
            .iter()
            .flat_map(|p| p.samples.iter().map(|s| s.seq))
            .collect();
        assert_eq!(seqs, vec![0, 1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn samples_pushed_during_fallback_wait_stay_buffered() {
        let transport = RecordingTransport::new();
        transport.refuse_beacons(true);
        transport.hold_keepalives();
        let (buffer, manager) = manager(transport.clone());
        fill(&buffer, 0..2);

        let in_flight = tokio::spawn({
            let manager = manager.clone();
            async move { manager.flush(FlushTrigger::Manual).await }
        });
        transport.wait_for_keepalive().await;
        fill(&buffer, 2..4);
        transport.release_keepalives();

        assert_eq!(in_flight.await.unwrap(), Some(DeliveryOutcome::DeliveredFallback));
        assert_eq!(transport.delivered_payloads()[0].sample_count, 2);
        let remaining: Vec<u64> = buffer.drain().iter().map(|s| s.seq).collect();
        assert_eq!(remaining, vec![2, 3]);
    }

    #[tokio::test]
    async fn dispatch_sends_beacon_synchronously() {
        let transport = RecordingTransport::new();
        let (buffer, manager) = manager(transport.clone());
        fill(&buffer, 0..5);

        manager.dispatch(FlushTrigger::Hidden);

        assert!(buffer.is_empty());
        assert_eq!(transport.delivered_payloads()[0].sample_count, 5);
        assert_eq!(
            manager.metrics().snapshot().recent_flushes[0].trigger,
            FlushTrigger::Hidden
        );
    }

    #[tokio::test]
    async fn dispatch_defers_fallback_to_runtime() {
        let transport = RecordingTransport::new();
        transport.refuse_beacons(true);
        let (buffer, manager) = manager(transport.clone());
        fill(&buffer, 0..2);

        manager.dispatch(FlushTrigger::PageHide);
        assert!(buffer.is_empty());

        transport.wait_for_keepalive().await;
        tokio::task::yield_now().await;
        assert_eq!(transport.delivered_payloads().len(), 1);
    }
}
