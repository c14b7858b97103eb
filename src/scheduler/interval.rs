//! Poll interval selection
//!
//! The base interval comes from the network stability band. Sync quality
//! and drift variance then scale it, and the result is clamped to the
//! configured bounds.

use std::time::Duration;

use crate::network::QualityBand;
use crate::types::SchedulerConfig;

/// Computes how long to wait before the next drift sample
#[derive(Debug, Clone)]
pub struct AdaptiveScheduler {
    config: SchedulerConfig,
    current: Duration,
}

impl AdaptiveScheduler {
    /// Create a scheduler starting at the excellent-band interval
    #[must_use]
    pub fn new(config: &SchedulerConfig) -> Self {
        let current = config
            .excellent_interval
            .clamp(config.min_interval, config.max_interval);
        Self {
            config: config.clone(),
            current,
        }
    }

    /// Interval chosen by the most recent call to [`Self::next_interval`]
    #[must_use]
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Unscaled interval for a stability score
    #[must_use]
    pub fn base_interval(&self, network_stability: f64) -> Duration {
        match QualityBand::from_stability(network_stability) {
            QualityBand::Excellent => self.config.excellent_interval,
            QualityBand::Good => self.config.good_interval,
            QualityBand::Fair => self.config.fair_interval,
            QualityBand::Poor => self.config.poor_interval,
        }
    }

    /// Compute an interval without updating the scheduler
    #[must_use]
    pub fn compute(&self, network_stability: f64, sync_quality: f64, drift_variance: f64) -> Duration {
        let mut ms = self.base_interval(network_stability).as_secs_f64() * 1000.0;

        if sync_quality < 0.5 {
            ms *= 0.7;
        } else if sync_quality > 0.8 {
            ms *= 1.2;
        }

        if drift_variance > 0.01 {
            ms *= 0.8;
        } else if drift_variance < 0.001 {
            ms *= 1.1;
        }

        let min = self.config.min_interval.as_secs_f64() * 1000.0;
        let max = self.config.max_interval.as_secs_f64() * 1000.0;
        Duration::from_secs_f64(ms.clamp(min, max) / 1000.0)
    }

    /// Compute and remember the next interval
    ///
    /// Returns the new interval; callers reschedule their timer when it
    /// differs from [`Self::current`] before the call.
    pub fn next_interval(
        &mut self,
        network_stability: f64,
        sync_quality: f64,
        drift_variance: f64,
    ) -> Duration {
        let next = self.compute(network_stability, sync_quality, drift_variance);
        if next != self.current {
            tracing::debug!(
                from_ms = self.current.as_millis(),
                interval_ms = next.as_millis(),
                stability = network_stability,
                sync_quality,
                "Scheduler: poll interval changed"
            );
            self.current = next;
        }
        next
    }
}
