mod http;
mod loop_worker;
mod manager;
mod transport;

pub use http::HttpTransport;
pub use manager::{DeliveryManager, DEFAULT_FLUSH_INTERVAL};
pub use transport::{DeliveryOutcome, FlushTrigger, Transport, TransportFuture};
