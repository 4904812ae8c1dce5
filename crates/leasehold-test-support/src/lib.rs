//! Shared test doubles for the Leasehold rental platform.

mod clock;
mod recorder;

pub use clock::FixedClock;
pub use recorder::{FailingRecorder, FlakyRecorder};
