//! Network quality tracking
//!
//! Keeps a short history of round-trip times and turns its variance into a
//! stability score. Runs of lost probes decay the score until a probe
//! succeeds again.

use std::collections::VecDeque;

use serde::Serialize;

use crate::error::{Result, SyncError};
use crate::types::NetworkConfig;

/// Lowest stability ever reported
const MIN_STABILITY: f64 = 0.1;

/// Coarse network quality classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityBand {
    /// Stability above 0.8
    Excellent,
    /// Stability above 0.6
    Good,
    /// Stability above 0.4
    Fair,
    /// Anything lower
    Poor,
}

impl QualityBand {
    /// Classify a stability score
    #[must_use]
    pub fn from_stability(stability: f64) -> Self {
        if stability > 0.8 {
            Self::Excellent
        } else if stability > 0.6 {
            Self::Good
        } else if stability > 0.4 {
            Self::Fair
        } else {
            Self::Poor
        }
    }
}

/// Point-in-time view of network quality
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkQuality {
    /// Stability in [0.1, 1.0]
    pub stability: f64,
    /// Recent round-trip times (ms), oldest first
    pub rtt_history: Vec<f64>,
    /// Consecutive lost probes
    pub packet_loss_streak: u32,
}

/// Tracks RTT samples and probe loss
#[derive(Debug, Clone)]
pub struct NetworkQualityMonitor {
    rtts: VecDeque<f64>,
    capacity: usize,
    loss_streak: u32,
    loss_streak_threshold: u32,
    loss_decay: f64,
    /// Multiplicative penalty accumulated during the current loss streak
    loss_penalty: f64,
}

impl NetworkQualityMonitor {
    /// Create a monitor with no samples (stability 1.0)
    #[must_use]
    pub fn new(config: &NetworkConfig) -> Self {
        let capacity = config.rtt_history_capacity.max(1);
        Self {
            rtts: VecDeque::with_capacity(capacity),
            capacity,
            loss_streak: 0,
            loss_streak_threshold: config.loss_streak_threshold.max(1),
            loss_decay: config.loss_decay.clamp(0.0, 1.0),
            loss_penalty: 1.0,
        }
    }

    /// Record a successful probe
    ///
    /// # Errors
    ///
    /// Returns `SyncError::InvalidSample` for negative or non-finite RTTs.
    pub fn record_rtt(&mut self, rtt_ms: f64) -> Result<()> {
        if !rtt_ms.is_finite() || rtt_ms < 0.0 {
            return Err(SyncError::invalid_sample(format!("invalid rtt {rtt_ms}")));
        }
        while self.rtts.len() >= self.capacity {
            self.rtts.pop_front();
        }
        self.rtts.push_back(rtt_ms);
        if self.loss_streak > 0 {
            tracing::debug!(streak = self.loss_streak, "Network: probe recovered");
        }
        self.loss_streak = 0;
        self.loss_penalty = 1.0;
        Ok(())
    }

    /// Record a probe that timed out or failed
    pub fn record_loss(&mut self) {
        self.loss_streak = self.loss_streak.saturating_add(1);
        if self.loss_streak >= self.loss_streak_threshold {
            self.loss_penalty *= self.loss_decay;
            tracing::warn!(
                streak = self.loss_streak,
                stability = self.stability(),
                "Network: sustained probe loss"
            );
        }
    }

    /// Stability score in [0.1, 1.0]
    #[must_use]
    pub fn stability(&self) -> f64 {
        let base = (1.0 - self.rtt_variance() / 100.0).clamp(MIN_STABILITY, 1.0);
        (base * self.loss_penalty).clamp(MIN_STABILITY, 1.0)
    }

    /// Band the current stability falls in
    #[must_use]
    pub fn band(&self) -> QualityBand {
        QualityBand::from_stability(self.stability())
    }

    /// Population variance of the RTT history (ms²)
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn rtt_variance(&self) -> f64 {
        if self.rtts.len() < 2 {
            return 0.0;
        }
        let n = self.rtts.len() as f64;
        let mean = self.rtts.iter().sum::<f64>() / n;
        self.rtts.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n
    }

    /// Mean RTT (ms), if any sample exists
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_rtt(&self) -> Option<f64> {
        if self.rtts.is_empty() {
            return None;
        }
        Some(self.rtts.iter().sum::<f64>() / self.rtts.len() as f64)
    }

    /// Most recent RTT (ms)
    #[must_use]
    pub fn latest_rtt(&self) -> Option<f64> {
        self.rtts.back().copied()
    }

    /// Consecutive lost probes
    #[must_use]
    pub fn loss_streak(&self) -> u32 {
        self.loss_streak
    }

    /// Snapshot for reporting
    #[must_use]
    pub fn snapshot(&self) -> NetworkQuality {
        NetworkQuality {
            stability: self.stability(),
            rtt_history: self.rtts.iter().copied().collect(),
            packet_loss_streak: self.loss_streak,
        }
    }

    /// Forget all samples
    pub fn reset(&mut self) {
        self.rtts.clear();
        self.loss_streak = 0;
        self.loss_penalty = 1.0;
    }
}
