mod signal;

pub use signal::{SignalState, SignalTracker, DEFAULT_ACTIVITY_GRACE};
