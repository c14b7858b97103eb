//! Poll scheduling
//!
//! [`AdaptiveScheduler`] decides how often to sample; [`PollTimer`] does
//! the waiting.

pub mod interval;
pub mod timer;


pub use interval::AdaptiveScheduler;
pub use timer::PollTimer;
