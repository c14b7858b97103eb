//! Instantaneous drift measurement

use std::time::Duration;

use crate::error::{Result, SyncError};
use crate::types::{CanonicalState, DriftConfig};

/// Inputs for one drift measurement
#[derive(Debug, Clone, Copy)]
pub struct SampleInputs<'a> {
    /// Canonical state to compare against
    pub state: &'a CanonicalState,
    /// Local media position (seconds)
    pub local_position: f64,
    /// Local time (ms)
    pub now_ms: f64,
    /// Smoothed clock offset (seconds)
    pub offset_secs: f64,
    /// Latest round-trip estimate (ms), if any
    pub rtt_ms: Option<f64>,
}

/// Result of one drift measurement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriftMeasurement {
    /// `current - expected` (seconds); positive means the local player is ahead
    pub drift: f64,
    /// Expected canonical position (seconds)
    pub expected: f64,
    /// Local position (seconds)
    pub current: f64,
}

/// Computes drift between the local player and the canonical position
#[derive(Debug, Clone)]
pub struct DriftSampler {
    /// Device output latency (seconds)
    output_latency: f64,
    /// Add half the round trip to the expected position
    compensate_one_way_delay: bool,
}

impl DriftSampler {
    /// Create a sampler
    ///
    /// `measured_latency` is the device's audio output latency when the
    /// platform can report it; otherwise the configured default is used.
    #[must_use]
    pub fn new(config: &DriftConfig, measured_latency: Option<Duration>) -> Self {
        let latency = measured_latency.unwrap_or(config.default_output_latency);
        Self {
            output_latency: latency.as_secs_f64(),
            compensate_one_way_delay: config.compensate_one_way_delay,
        }
    }

    /// Output latency in seconds
    #[must_use]
    pub fn output_latency(&self) -> f64 {
        self.output_latency
    }

    /// Expected canonical position at `now_ms`
    ///
    /// While the group is paused the canonical position does not advance.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::InvalidSample` if the result is non-finite or negative.
    pub fn expected_position(
        &self,
        state: &CanonicalState,
        now_ms: f64,
        offset_secs: f64,
        rtt_ms: Option<f64>,
    ) -> Result<f64> {
        let expected = if state.is_playing {
            let elapsed = (now_ms - state.last_updated_at) / 1000.0;
            let one_way = match rtt_ms {
                Some(rtt) if self.compensate_one_way_delay && rtt.is_finite() && rtt > 0.0 => {
                    rtt / 2000.0
                }
                _ => 0.0,
            };
            state.position_at_timestamp + elapsed - self.output_latency + one_way + offset_secs
        } else {
            state.position_at_timestamp
        };

        if !expected.is_finite() {
            return Err(SyncError::invalid_sample("expected position is not finite"));
        }
        if expected < 0.0 {
            return Err(SyncError::invalid_sample(format!(
                "expected position {expected:.3}s is negative"
            )));
        }
        Ok(expected)
    }

    /// Measure drift for the given inputs
    ///
    /// # Errors
    ///
    /// Returns `SyncError::InvalidSample` if the expected or local position is unusable.
    pub fn measure(&self, inputs: &SampleInputs<'_>) -> Result<DriftMeasurement> {
        if !inputs.local_position.is_finite() {
            return Err(SyncError::invalid_sample("local position is not finite"));
        }
        let expected = self.expected_position(
            inputs.state,
            inputs.now_ms,
            inputs.offset_secs,
            inputs.rtt_ms,
        )?;
        Ok(DriftMeasurement {
            drift: inputs.local_position - expected,
            expected,
            current: inputs.local_position,
        })
    }
}
