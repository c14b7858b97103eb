//! Clock offset estimation.
//!
//! Estimates `server_clock - local_clock` from round trips through the
//! session's time source. Each round trip yields
//!
//! ```text
//! rtt    = client_received - client_sent
//! offset = server_time + rtt / 2 - client_received
//! ```
//!
//! Batches are averaged, with the standard deviation kept as a jitter
//! estimate. Observations only move the target. The published offset moves
//! on [`OffsetEstimator::advance`], never by more than the smoothing
//! threshold or one of a fixed number of equal steps toward the target, so
//! rate math downstream does not see audible discontinuities.

use crate::error::{Result, SyncError};
use crate::types::OffsetConfig;

/// One round trip through the canonical time source, all in milliseconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSample {
    /// Local time the probe was sent
    pub client_sent: f64,
    /// Server time reported in the reply
    pub server_time: f64,
    /// Server time the probe was received
    pub server_received: f64,
    /// Local time the reply arrived
    pub client_received: f64,
}

impl TimeSample {
    /// Round-trip time in milliseconds
    #[must_use]
    pub fn rtt_ms(&self) -> f64 {
        self.client_received - self.client_sent
    }

    /// Raw offset estimate in milliseconds
    #[must_use]
    pub fn offset_ms(&self) -> f64 {
        self.server_time + self.rtt_ms() / 2.0 - self.client_received
    }

    fn check(&self) -> Result<()> {
        let fields = [
            self.client_sent,
            self.server_time,
            self.server_received,
            self.client_received,
        ];
        if fields.iter().any(|v| !v.is_finite()) {
            return Err(SyncError::invalid_sample("non-finite timestamp"));
        }
        if self.rtt_ms() < 0.0 {
            return Err(SyncError::invalid_sample(format!(
                "negative round trip ({:.1}ms)",
                self.rtt_ms()
            )));
        }
        Ok(())
    }
}

/// Aggregate of a batch of time samples
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffsetBatch {
    /// Mean offset of the accepted samples (ms)
    pub offset_ms: f64,
    /// Standard deviation of the accepted offsets (ms)
    pub jitter_ms: f64,
    /// Mean round trip of the accepted samples (ms)
    pub rtt_ms: f64,
    /// Samples that passed validation
    pub accepted: usize,
    /// Samples discarded as invalid
    pub rejected: usize,
}

/// Smoothed clock offset estimator
#[derive(Debug, Clone)]
pub struct OffsetEstimator {
    /// Largest accepted magnitude (ms)
    max_offset_ms: f64,
    /// Differences at or below this are applied directly (ms)
    smoothing_threshold_ms: f64,
    /// Steps used to approach a distant target
    smoothing_steps: u32,
    /// Minimum valid samples per batch
    min_batch_samples: usize,
    /// Published offset (ms)
    smoothed_ms: f64,
    /// Offset being approached (ms)
    target_ms: f64,
    /// Signed per-advance step toward the target (ms)
    step_ms: f64,
    /// Jitter of the last batch (ms)
    jitter_ms: f64,
    /// Samples applied
    accepted: u64,
    /// Samples discarded
    rejected: u64,
}

impl OffsetEstimator {
    /// Create an estimator with a zero offset
    #[must_use]
    pub fn new(config: &OffsetConfig) -> Self {
        Self {
            max_offset_ms: config.max_offset.as_secs_f64() * 1000.0,
            smoothing_threshold_ms: config.smoothing_threshold.as_secs_f64() * 1000.0,
            smoothing_steps: config.smoothing_steps.max(1),
            min_batch_samples: config.min_batch_samples.max(1),
            smoothed_ms: 0.0,
            target_ms: 0.0,
            step_ms: 0.0,
            jitter_ms: 0.0,
            accepted: 0,
            rejected: 0,
        }
    }

    /// Current smoothed offset in milliseconds
    #[must_use]
    pub fn offset_ms(&self) -> f64 {
        self.smoothed_ms
    }

    /// Current smoothed offset in seconds
    #[must_use]
    pub fn offset_secs(&self) -> f64 {
        self.smoothed_ms / 1000.0
    }

    /// Offset the estimator is converging toward (ms)
    #[must_use]
    pub fn target_ms(&self) -> f64 {
        self.target_ms
    }

    /// Whether the published offset still lags the target
    #[must_use]
    pub fn is_converging(&self) -> bool {
        (self.target_ms - self.smoothed_ms).abs() > f64::EPSILON
    }

    /// Jitter of the most recent batch (ms)
    #[must_use]
    pub fn jitter_ms(&self) -> f64 {
        self.jitter_ms
    }

    /// Largest accepted offset magnitude (ms)
    #[must_use]
    pub fn max_offset_ms(&self) -> f64 {
        self.max_offset_ms
    }

    /// Number of accepted and rejected observations
    #[must_use]
    pub fn counts(&self) -> (u64, u64) {
        (self.accepted, self.rejected)
    }

    fn check_offset(&self, offset_ms: f64) -> Result<f64> {
        if !offset_ms.is_finite() {
            return Err(SyncError::invalid_sample("non-finite offset"));
        }
        if offset_ms.abs() > self.max_offset_ms {
            return Err(SyncError::invalid_sample(format!(
                "offset {offset_ms:.1}ms exceeds +/-{:.0}ms",
                self.max_offset_ms
            )));
        }
        Ok(offset_ms)
    }

    fn reject(&mut self, err: SyncError) -> SyncError {
        self.rejected += 1;
        tracing::warn!(error = %err, "Offset: discarding sample");
        err
    }

    /// Feed a raw offset (ms) and make it the new target
    ///
    /// Returns the accepted offset. The published offset does not move until
    /// the next [`advance`](Self::advance).
    ///
    /// # Errors
    ///
    /// Returns `SyncError::InvalidSample` for non-finite or out-of-range
    /// offsets; the target is left untouched.
    pub fn observe(&mut self, raw_offset_ms: f64) -> Result<f64> {
        let offset = self
            .check_offset(raw_offset_ms)
            .map_err(|e| self.reject(e))?;
        self.accepted += 1;
        self.retarget(offset);
        Ok(offset)
    }

    /// Feed a single round trip
    ///
    /// # Errors
    ///
    /// Returns `SyncError::InvalidSample` when the sample or its offset is invalid.
    pub fn observe_sample(&mut self, sample: &TimeSample) -> Result<f64> {
        sample.check().map_err(|e| self.reject(e))?;
        self.observe(sample.offset_ms())
    }

    /// Aggregate a batch of round trips and target their mean
    ///
    /// # Errors
    ///
    /// Returns `SyncError::InvalidSample` when fewer than the configured
    /// minimum of samples are valid.
    pub fn observe_batch(&mut self, samples: &[TimeSample]) -> Result<OffsetBatch> {
        let mut offsets = Vec::with_capacity(samples.len());
        let mut rtts = Vec::with_capacity(samples.len());
        let mut rejected = 0;

        for sample in samples {
            match sample
                .check()
                .and_then(|()| self.check_offset(sample.offset_ms()))
            {
                Ok(offset) => {
                    offsets.push(offset);
                    rtts.push(sample.rtt_ms());
                }
                Err(e) => {
                    rejected += 1;
                    self.reject(e);
                }
            }
        }

        if offsets.len() < self.min_batch_samples {
            return Err(SyncError::invalid_sample(format!(
                "only {} of {} samples valid, need {}",
                offsets.len(),
                samples.len(),
                self.min_batch_samples
            )));
        }

        let offset_ms = mean(&offsets);
        let jitter_ms = std_dev(&offsets, offset_ms);
        let batch = OffsetBatch {
            offset_ms,
            jitter_ms,
            rtt_ms: mean(&rtts),
            accepted: offsets.len(),
            rejected,
        };

        self.accepted += offsets.len() as u64;
        self.jitter_ms = jitter_ms;
        self.retarget(offset_ms);

        tracing::debug!(
            offset_ms = batch.offset_ms,
            jitter_ms = batch.jitter_ms,
            rtt_ms = batch.rtt_ms,
            accepted = batch.accepted,
            rejected = batch.rejected,
            smoothed_ms = self.smoothed_ms,
            "Offset: batch accepted"
        );

        Ok(batch)
    }

    fn retarget(&mut self, target_ms: f64) {
        // Re-observing the same target keeps the step it was approached with
        if self.is_converging() && (target_ms - self.target_ms).abs() <= f64::EPSILON {
            return;
        }
        self.target_ms = target_ms;
        let diff = target_ms - self.smoothed_ms;
        self.step_ms = if diff.abs() <= self.smoothing_threshold_ms {
            diff
        } else {
            diff / f64::from(self.smoothing_steps)
        };
    }

    /// Take one smoothing step toward the target and return the new offset
    ///
    /// Callers advance once per sampling pass, however many observations
    /// arrived since the last one.
    pub fn advance(&mut self) -> f64 {
        let remaining = self.target_ms - self.smoothed_ms;
        if remaining.abs() <= self.step_ms.abs() * (1.0 + 1e-9) {
            self.smoothed_ms = self.target_ms;
        } else {
            self.smoothed_ms += self.step_ms;
        }
        self.smoothed_ms
    }

    /// Forget everything and return to a zero offset
    pub fn reset(&mut self) {
        self.smoothed_ms = 0.0;
        self.target_ms = 0.0;
        self.step_ms = 0.0;
        self.jitter_ms = 0.0;
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

#[allow(clippy::cast_precision_loss)]
fn std_dev(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}
