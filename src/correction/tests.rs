
use crate::drift::{DriftAnalysis, SyncMode};

/// Analysis with a fixed threshold and mode
pub(super) fn analysis(threshold: f64, mode: SyncMode) -> DriftAnalysis {
    DriftAnalysis {
        trend: 0.0,
        velocity: 0.0,
        adaptive_threshold: threshold,
        sync_quality: 0.8,
        sync_mode: mode,
        avg_drift: 0.0,
        variance: 0.0,
        drift_stability: 1.0,
        predicted_drift: 0.0,
        sample_count: 10,
    }
}
