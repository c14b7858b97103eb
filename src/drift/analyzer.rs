//! Drift trend analysis and adaptive thresholds.
//!
//! The analyzer owns the session's drift history. Every derived figure is a
//! pure function of that history plus the [`AnalysisContext`] passed in, so
//! analyzing twice without a new sample yields the same result.

use serde::Serialize;

use super::history::{DriftHistory, DriftSample};

/// Samples averaged on each side of the trend comparison
const TREND_WINDOW: usize = 3;

/// Samples used by the regression estimator
const REGRESSION_WINDOW: usize = 5;

/// Exponential smoothing factor of the third estimator
const SMOOTHING_ALPHA: f64 = 0.3;

/// How eagerly the loop should correct
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Drift is small and steady on a good network; demand more confirmation
    Conservative,
    /// Default behavior
    Normal,
    /// Drift is moving fast or erratic; act on the first detection
    Aggressive,
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Conservative => write!(f, "conservative"),
            Self::Normal => write!(f, "normal"),
            Self::Aggressive => write!(f, "aggressive"),
        }
    }
}

/// External inputs to an analysis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalysisContext {
    /// Base drift threshold (seconds)
    pub base_threshold: f64,
    /// Network stability in [0, 1]
    pub network_stability: f64,
    /// Corrections in a row that did not improve drift
    pub consecutive_failed_corrections: u32,
    /// Multiplier from the correction success tracker
    pub threshold_multiplier: f64,
    /// Horizon of the drift prediction (seconds)
    pub prediction_horizon: f64,
}

impl Default for AnalysisContext {
    fn default() -> Self {
        Self {
            base_threshold: 0.12,
            network_stability: 1.0,
            consecutive_failed_corrections: 0,
            threshold_multiplier: 1.0,
            prediction_horizon: 1.0,
        }
    }
}

/// Derived view of the drift history
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftAnalysis {
    /// Recent mean drift minus the preceding mean (seconds)
    pub trend: f64,
    /// Trend per second
    pub velocity: f64,
    /// Drift above which a correction is considered (seconds)
    pub adaptive_threshold: f64,
    /// Overall sync quality in [0, 1]
    pub sync_quality: f64,
    /// Recommended correction eagerness
    pub sync_mode: SyncMode,
    /// Mean absolute drift (seconds)
    pub avg_drift: f64,
    /// Variance of the signed drift
    pub variance: f64,
    /// `1 - min(1, variance * 20)`
    pub drift_stability: f64,
    /// Predicted drift magnitude at the horizon (seconds)
    pub predicted_drift: f64,
    /// Samples the analysis is based on
    pub sample_count: usize,
}

/// Stateful drift analyzer holding the rolling history
#[derive(Debug, Clone, Default)]
pub struct DriftAnalyzer {
    history: DriftHistory,
}

impl DriftAnalyzer {
    /// Create an analyzer with the given history capacity
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            history: DriftHistory::new(capacity),
        }
    }

    /// Append a sample
    pub fn record(&mut self, sample: DriftSample) {
        self.history.push(sample);
    }

    /// Borrow the history
    #[must_use]
    pub fn history(&self) -> &DriftHistory {
        &self.history
    }

    /// Drop the history (track change)
    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// Analyze the current history
    #[must_use]
    pub fn analyze(&self, ctx: &AnalysisContext) -> DriftAnalysis {
        let drifts: Vec<f64> = self.history.iter().map(|s| s.drift).collect();
        let magnitudes: Vec<f64> = drifts.iter().map(|d| d.abs()).collect();

        let avg_drift = mean(&magnitudes);
        let variance = variance(&drifts);
        let (trend, velocity) = self.trend();
        let drift_stability = 1.0 - (variance * 20.0).min(1.0);
        let network_stability = ctx.network_stability.clamp(0.0, 1.0);
        let failed = f64::from(ctx.consecutive_failed_corrections);

        let variance_factor = (1.0 / (1.0 + 10.0 * variance)).clamp(0.5, 2.0);
        let network_factor = network_stability.clamp(0.8, 1.2);
        let correction_factor = (1.0 - 0.05 * failed).clamp(0.9, 1.1);
        let adaptive_threshold = ctx.base_threshold
            * variance_factor
            * network_factor
            * correction_factor
            * ctx.threshold_multiplier;

        let sync_quality = (0.5 * (1.0 - 2.0 * avg_drift)
            + 0.3 * network_stability
            + 0.2 * (1.0 - 0.1 * failed))
            .clamp(0.0, 1.0);

        let sync_mode = if velocity.abs() > 0.015 || drift_stability < 0.3 {
            SyncMode::Aggressive
        } else if avg_drift < 0.015 && drift_stability > 0.7 && network_stability > 0.8 {
            SyncMode::Conservative
        } else {
            SyncMode::Normal
        };

        DriftAnalysis {
            trend,
            velocity,
            adaptive_threshold,
            sync_quality,
            sync_mode,
            avg_drift,
            variance,
            drift_stability,
            predicted_drift: self.predict(ctx.prediction_horizon),
            sample_count: self.history.len(),
        }
    }

    /// Trend and velocity from the two most recent windows
    fn trend(&self) -> (f64, f64) {
        if self.history.len() < TREND_WINDOW * 2 {
            return (0.0, 0.0);
        }
        let window = self.history.recent(TREND_WINDOW * 2);
        let (older, newer) = window.split_at(TREND_WINDOW);

        let trend = mean_of(newer, |s| s.drift) - mean_of(older, |s| s.drift);
        let dt_ms = mean_of(newer, |s| s.observed_at) - mean_of(older, |s| s.observed_at);
        let velocity = if dt_ms > 0.0 {
            trend / dt_ms * 1000.0
        } else {
            0.0
        };
        (trend, velocity)
    }

    /// Predicted drift magnitude `horizon` seconds after the newest sample
    ///
    /// Blends a linear regression over the last five samples, a recency
    /// weighted average and an exponential smoothing. The regression's share
    /// shrinks with confidence, which falls as variance rises.
    #[must_use]
    pub fn predict(&self, horizon: f64) -> f64 {
        let Some(latest) = self.history.latest() else {
            return 0.0;
        };
        let magnitudes: Vec<f64> = self.history.iter().map(|s| s.drift.abs()).collect();
        let drifts: Vec<f64> = self.history.iter().map(|s| s.drift).collect();

        let regression = {
            let recent = self.history.recent(REGRESSION_WINDOW);
            let points: Vec<(f64, f64)> = recent
                .iter()
                .map(|s| ((s.observed_at - latest.observed_at) / 1000.0, s.drift.abs()))
                .collect();
            linear_fit(&points).map_or(latest.drift.abs(), |(slope, intercept)| {
                intercept + slope * horizon
            })
        };

        let weighted = {
            let mut total = 0.0;
            let mut weight_sum = 0.0;
            for (i, value) in magnitudes.iter().enumerate() {
                #[allow(clippy::cast_precision_loss)]
                let weight = (i + 1) as f64;
                total += value * weight;
                weight_sum += weight;
            }
            total / weight_sum
        };

        let smoothed = magnitudes
            .iter()
            .skip(1)
            .fold(magnitudes[0], |acc, v| SMOOTHING_ALPHA * v + (1.0 - SMOOTHING_ALPHA) * acc);

        let confidence = (1.0 - variance(&drifts) * 10.0).clamp(0.1, 1.0);
        let regression_weight = 0.4 * confidence;
        let weighted_weight = 0.4 + 0.4 * (1.0 - confidence);

        let blended = regression_weight * regression + weighted_weight * weighted + 0.2 * smoothed;
        blended.max(0.0)
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn mean_of(samples: &[DriftSample], f: impl Fn(&DriftSample) -> f64) -> f64 {
    let values: Vec<f64> = samples.iter().map(f).collect();
    mean(&values)
}

#[allow(clippy::cast_precision_loss)]
fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

/// Least-squares fit returning `(slope, intercept)`
#[allow(clippy::cast_precision_loss)]
fn linear_fit(points: &[(f64, f64)]) -> Option<(f64, f64)> {
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;
    let sxx: f64 = points.iter().map(|p| (p.0 - mean_x).powi(2)).sum();
    if sxx <= f64::EPSILON {
        return None;
    }
    let sxy: f64 = points
        .iter()
        .map(|p| (p.0 - mean_x) * (p.1 - mean_y))
        .sum();
    let slope = sxy / sxx;
    Some((slope, mean_y - slope * mean_x))
}
