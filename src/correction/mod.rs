//! Tiered drift correction
//!
//! Corrections escalate from a brief rate nudge through gradual rate
//! changes to a direct seek. [`CorrectionEngine`] owns the single phase
//! that decides whether the media element may be touched.

pub mod engine;
pub mod phase;
pub mod tier;
pub mod tracker;
pub mod transition;

#[cfg(test)]
mod tests;

pub use engine::{
    AppliedCorrection, CorrectionDecision, CorrectionEngine, CorrectionState, NoopReason,
};
pub use phase::CorrectionPhase;
pub use tier::{CorrectionTier, SeekUrgency, classify, seek_urgency};
pub use tracker::{CorrectionOutcome, SuccessTracker};
pub use transition::{NEUTRAL_RATE, RateTransition};
