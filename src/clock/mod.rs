//! Local time and clock offset estimation.
//!
//! The local clock is injected through [`LocalClock`] so that the whole
//! control loop can be driven deterministically in tests. The offset toward
//! the session's canonical clock is estimated by [`OffsetEstimator`].

pub mod local;
pub mod offset;
pub mod probe;


pub use local::{LocalClock, ManualClock, SystemClock};
pub use offset::{OffsetBatch, OffsetEstimator, TimeSample};
pub use probe::{probe_once, refresh_offset};
