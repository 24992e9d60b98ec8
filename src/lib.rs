//! Reading-behaviour telemetry for the NPTI article view.
//!
//! While an article is open the tracker samples pointer and scroll activity on
//! a fixed clock, scores how close the cursor stays to the article body, and
//! ships batches of samples to the behaviour endpoint. Batches go out on a
//! timer and whenever the page is hidden or unloaded.
//!
//! ```ignore
//! let transport = Arc::new(HttpTransport::from_settings(&settings)?);
//! let tracker = start_tracking(page, transport, news_id, viewer_id, 100)?;
//! // ...
//! tracker.stop().await;
//! ```

pub mod delivery;
pub mod host;
pub mod metrics;
pub mod models;
pub mod sampling;
pub mod settings;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod tracker;
pub mod tracking;
mod utils;

pub use delivery::{DeliveryOutcome, FlushTrigger, HttpTransport, Transport};
pub use host::{ClientRect, HostError, PageEventSink, PageHost, Viewport};
pub use metrics::MetricsSnapshot;
pub use models::{DeliveryPayload, Sample, GUEST_VIEWER_ID};
pub use sampling::TrackerStatus;
pub use settings::{SettingsStore, TrackerSettings};
pub use tracker::{start_tracking, start_tracking_with, TrackerHandle};
pub use utils::logging::init_logging;
