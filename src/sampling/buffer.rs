use std::sync::Mutex;

use crate::models::Sample;
use crate::utils::sync::lock;

/// Append-only sample store shared by the clock (producer) and the delivery
/// manager (consumer).
#[derive(Debug, Default)]
pub struct SampleBuffer {
    samples: Mutex<Vec<Sample>>,
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, sample: Sample) {
        lock(&self.samples).push(sample);
    }

    /// Swap the contents out for an empty buffer and return them.
    ///
    /// Anything pushed after this returns lands in the fresh buffer.
    pub fn drain(&self) -> Vec<Sample> {
        std::mem::take(&mut *lock(&self.samples))
    }

    pub fn len(&self) -> usize {
        lock(&self.samples).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
