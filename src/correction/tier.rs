//! Tier classification
//!
//! Tiers are ordered by disruptiveness. Classification only looks at the
//! drift magnitude; threshold, cooldown and confirmation checks belong to
//! the engine.

use serde::Serialize;

use crate::types::CorrectionConfig;

/// Correction strategy, least disruptive first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionTier {
    /// Brief small rate nudge
    Micro,
    /// Gradual rate correction held for the rate horizon
    Rate,
    /// Gentler rate correction over a longer horizon
    ExtendedRate,
    /// Direct seek to the expected position
    EmergencySeek,
}

impl std::fmt::Display for CorrectionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Micro => write!(f, "micro"),
            Self::Rate => write!(f, "rate"),
            Self::ExtendedRate => write!(f, "extended_rate"),
            Self::EmergencySeek => write!(f, "emergency_seek"),
        }
    }
}

/// How urgent an emergency seek is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeekUrgency {
    /// Subject to the jitter buffer and both cooldowns
    Standard,
    /// Large gap; bypasses confirmation and cooldowns
    LargeGap,
    /// Critical gap; same bypasses as a large gap
    Critical,
}

impl SeekUrgency {
    /// Whether the seek skips confirmation and cooldown checks
    #[must_use]
    pub fn bypasses_guards(self) -> bool {
        !matches!(self, Self::Standard)
    }
}

/// Select the tier for a drift magnitude (seconds)
#[must_use]
pub fn classify(magnitude: f64, config: &CorrectionConfig) -> CorrectionTier {
    if magnitude >= config.emergency_threshold {
        CorrectionTier::EmergencySeek
    } else if magnitude >= config.rate_max_drift {
        CorrectionTier::ExtendedRate
    } else if magnitude >= config.micro_max_drift {
        CorrectionTier::Rate
    } else {
        CorrectionTier::Micro
    }
}

/// Urgency of a drift magnitude, if it warrants a seek at all
#[must_use]
pub fn seek_urgency(magnitude: f64, config: &CorrectionConfig) -> Option<SeekUrgency> {
    if magnitude >= config.critical_threshold {
        Some(SeekUrgency::Critical)
    } else if magnitude >= config.large_gap_threshold {
        Some(SeekUrgency::LargeGap)
    } else if magnitude >= config.emergency_threshold {
        Some(SeekUrgency::Standard)
    } else {
        None
    }
}
