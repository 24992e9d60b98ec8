mod payload;
mod sample;

pub use payload::{DeliveryPayload, GUEST_VIEWER_ID};
pub use sample::Sample;
