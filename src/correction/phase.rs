//! Correction phase state machine

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use super::tier::CorrectionTier;
use super::transition::RateTransition;

/// What the engine is currently doing to the media element
///
/// Only one phase exists at a time, so combinations such as "seeking while
/// rate correcting" cannot be represented.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum CorrectionPhase {
    /// Nothing applied; playback rate is neutral
    #[default]
    Idle,
    /// Micro nudge active until its revert fires
    MicroCorrecting {
        /// Applied rate
        rate: f64,
    },
    /// Rate correction ramping toward, or holding, its target
    RateCorrecting {
        /// Rate currently applied
        rate: f64,
        /// Still stepping toward the target
        ramping: bool,
    },
    /// Extended rate correction ramping toward, or holding, its target
    ExtendedRateCorrecting {
        /// Rate currently applied
        rate: f64,
        /// Still stepping toward the target
        ramping: bool,
    },
    /// Seek issued; waiting for playback to settle
    EmergencySeeking {
        /// Position sought to (seconds)
        target: f64,
    },
    /// A manual resync owns the media element
    Resyncing,
}

impl CorrectionPhase {
    /// Build the phase of a rate-type tier
    #[must_use]
    pub(crate) fn rate_phase(tier: CorrectionTier, rate: f64, ramping: bool) -> Self {
        match tier {
            CorrectionTier::ExtendedRate => Self::ExtendedRateCorrecting { rate, ramping },
            _ => Self::RateCorrecting { rate, ramping },
        }
    }

    /// Whether a new correction must be refused
    ///
    /// The hold phase of a rate correction does not count; a new correction
    /// cancels it instead.
    #[must_use]
    pub fn in_progress(&self) -> bool {
        match self {
            Self::Idle => false,
            Self::MicroCorrecting { .. } | Self::EmergencySeeking { .. } | Self::Resyncing => true,
            Self::RateCorrecting { ramping, .. } | Self::ExtendedRateCorrecting { ramping, .. } => {
                *ramping
            }
        }
    }

    /// Whether a non-neutral rate is applied
    #[must_use]
    pub fn rate_correction_active(&self) -> bool {
        matches!(
            self,
            Self::MicroCorrecting { .. }
                | Self::RateCorrecting { .. }
                | Self::ExtendedRateCorrecting { .. }
        )
    }

    /// Tier responsible for this phase
    #[must_use]
    pub fn active_tier(&self) -> Option<CorrectionTier> {
        match self {
            Self::Idle | Self::Resyncing => None,
            Self::MicroCorrecting { .. } => Some(CorrectionTier::Micro),
            Self::RateCorrecting { .. } => Some(CorrectionTier::Rate),
            Self::ExtendedRateCorrecting { .. } => Some(CorrectionTier::ExtendedRate),
            Self::EmergencySeeking { .. } => Some(CorrectionTier::EmergencySeek),
        }
    }

    /// Short label for logs and status
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::MicroCorrecting { .. } => "micro_correcting",
            Self::RateCorrecting { .. } => "rate_correcting",
            Self::ExtendedRateCorrecting { .. } => "extended_rate_correcting",
            Self::EmergencySeeking { .. } => "emergency_seeking",
            Self::Resyncing => "resyncing",
        }
    }
}

/// Phase plus the transition task driving it
#[derive(Debug, Default)]
pub(crate) struct PhaseCell {
    pub(crate) phase: CorrectionPhase,
    pub(crate) active: Option<RateTransition>,
}

impl PhaseCell {
    /// Cancel the running transition, if any
    pub(crate) fn cancel_active(&mut self) {
        if let Some(transition) = self.active.take() {
            transition.cancel();
        }
    }
}

pub(crate) type SharedPhase = Arc<Mutex<PhaseCell>>;

/// Lock the phase cell, recovering from a poisoned lock
pub(crate) fn lock(cell: &Mutex<PhaseCell>) -> MutexGuard<'_, PhaseCell> {
    cell.lock().unwrap_or_else(PoisonError::into_inner)
}
