//! Correction success tracking

use serde::Serialize;

use super::tier::CorrectionTier;

/// Result of comparing drift before and after a correction
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionOutcome {
    /// Tier that was applied
    pub tier: CorrectionTier,
    /// Drift magnitude when the correction started
    pub drift_before: f64,
    /// Drift magnitude observed after it finished
    pub drift_after: f64,
    /// `drift_before - drift_after`
    pub improvement: f64,
    /// Improved, and by at least 20%
    pub success: bool,
}

impl CorrectionOutcome {
    /// Evaluate a finished correction
    #[must_use]
    pub fn evaluate(tier: CorrectionTier, drift_before: f64, drift_after: f64) -> Self {
        let improvement = drift_before - drift_after;
        Self {
            tier,
            drift_before,
            drift_after,
            improvement,
            success: improvement > 0.0 && drift_after < 0.8 * drift_before,
        }
    }
}

/// Exponential moving average of correction success
#[derive(Debug, Clone)]
pub struct SuccessTracker {
    alpha: f64,
    rate: f64,
    samples: u64,
}

impl SuccessTracker {
    /// Create a tracker starting at a perfect record
    #[must_use]
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            rate: 1.0,
            samples: 0,
        }
    }

    /// Fold one outcome in and return the new rate
    pub fn record(&mut self, success: bool) -> f64 {
        let value = if success { 1.0 } else { 0.0 };
        self.rate = self.alpha * value + (1.0 - self.alpha) * self.rate;
        self.samples += 1;
        self.rate
    }

    /// Smoothed success rate in [0, 1]
    #[must_use]
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Outcomes recorded so far
    #[must_use]
    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Factor applied to the adaptive threshold
    ///
    /// A good record lowers the threshold so smaller drift gets corrected;
    /// a poor one raises it so ineffective corrections stop piling up.
    #[must_use]
    pub fn threshold_multiplier(&self) -> f64 {
        if self.rate >= 0.7 {
            0.9
        } else if self.rate < 0.3 {
            1.2
        } else {
            1.0
        }
    }

    /// Return to a perfect record
    pub fn reset(&mut self) {
        self.rate = 1.0;
        self.samples = 0;
    }
}

impl Default for SuccessTracker {
    fn default() -> Self {
        Self::new(0.3)
    }
}
