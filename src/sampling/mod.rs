pub mod buffer;
pub mod clock;
pub mod proximity;
pub mod state;

pub use buffer::SampleBuffer;
pub use clock::{SamplerClock, TickOutcome, DEFAULT_SAMPLE_PERIOD};
pub use proximity::{TargetReading, ABSENT_TARGET_DISTANCE};
pub use state::{SamplerState, TrackerStatus};
