//! Resync history and statistics

use std::collections::VecDeque;

use serde::Serialize;

use crate::error::SyncError;

/// How a single resync attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptResult {
    /// State received, validated and sought to
    Success,
    /// Transport or validation failure
    Failed,
    /// No reply in time
    Timeout,
}

impl AttemptResult {
    /// Classify an attempt error
    #[must_use]
    pub fn from_error(error: &SyncError) -> Self {
        match error {
            SyncError::Timeout { .. } => Self::Timeout,
            _ => Self::Failed,
        }
    }
}

/// One attempt of a resync
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResyncAttempt {
    /// 1-based attempt number within its resync
    pub attempt_number: u32,
    /// Local time (ms) the attempt was started
    pub requested_at: f64,
    /// How it ended
    pub result: AttemptResult,
    /// Signed drift before the seek, when a state was obtained
    pub drift_before: Option<f64>,
    /// Signed drift right after the seek
    pub drift_after: Option<f64>,
}

/// Cumulative resync counters
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResyncStats {
    /// Resyncs run to completion
    pub total_resyncs: u64,
    /// Resyncs that obtained a valid state
    pub successful_resyncs: u64,
    /// Resyncs that exhausted their attempts
    pub failed_resyncs: u64,
    /// Mean drift magnitude corrected by successful resyncs (seconds)
    pub average_drift: f64,
    /// Drift magnitude corrected by the latest successful resync
    pub last_drift: Option<f64>,
}

/// Bounded attempt log plus cumulative statistics
#[derive(Debug, Clone)]
pub struct ResyncLedger {
    attempts: VecDeque<ResyncAttempt>,
    capacity: usize,
    stats: ResyncStats,
    drift_sum: f64,
}

impl ResyncLedger {
    /// Create a ledger keeping `capacity` attempts
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            attempts: VecDeque::with_capacity(capacity),
            capacity,
            stats: ResyncStats::default(),
            drift_sum: 0.0,
        }
    }

    /// Append an attempt, evicting the oldest beyond capacity
    pub fn record_attempt(&mut self, attempt: ResyncAttempt) {
        while self.attempts.len() >= self.capacity {
            self.attempts.pop_front();
        }
        self.attempts.push_back(attempt);
    }

    /// Fold a finished resync into the counters
    ///
    /// `drift` is the signed drift corrected by a successful resync.
    #[allow(clippy::cast_precision_loss)]
    pub fn record_resync(&mut self, drift: Option<f64>) {
        self.stats.total_resyncs += 1;
        match drift {
            Some(drift) => {
                let magnitude = drift.abs();
                self.stats.successful_resyncs += 1;
                self.drift_sum += magnitude;
                self.stats.average_drift = self.drift_sum / self.stats.successful_resyncs as f64;
                self.stats.last_drift = Some(magnitude);
            }
            None => self.stats.failed_resyncs += 1,
        }
    }

    /// Attempts, oldest first
    pub fn attempts(&self) -> impl Iterator<Item = &ResyncAttempt> {
        self.attempts.iter()
    }

    /// Copy of the attempt log
    #[must_use]
    pub fn history(&self) -> Vec<ResyncAttempt> {
        self.attempts.iter().cloned().collect()
    }

    /// Cumulative counters
    #[must_use]
    pub fn stats(&self) -> ResyncStats {
        self.stats
    }
}

impl Default for ResyncLedger {
    fn default() -> Self {
        Self::new(5)
    }
}
