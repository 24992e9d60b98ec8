use std::sync::Arc;

use tokio::time::{self, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::manager::DeliveryManager;
use super::transport::FlushTrigger;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

/// Periodic flush, independent of the sampler's finer tick so long sessions
/// ship incrementally.
pub async fn flush_loop(
    manager: Arc<DeliveryManager>,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log_info!("flush loop shutting down");
                break;
            }
            _ = ticker.tick() => {
                if let Some(outcome) = manager.flush(FlushTrigger::Periodic).await {
                    log_debug!("periodic flush finished: {outcome:?}");
                }
            }
        }
    }
}
