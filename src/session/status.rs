//! Published session status

use std::time::Duration;

use serde::Serialize;

use crate::drift::SyncMode;
use crate::resync::ResyncStats;

/// Coarse sync state for display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Not started
    #[default]
    Idle,
    /// No usable canonical state yet
    WaitingForState,
    /// Drift inside the threshold
    InSync,
    /// Drift above the threshold, not yet acted on
    DriftDetected,
    /// A rate correction is running
    Correcting,
    /// An emergency seek was issued
    Seeking,
    /// A manual resync is running
    Resyncing,
    /// The last resync failed
    ResyncFailed,
    /// Local playback is paused
    Paused,
    /// The session was stopped
    Stopped,
}

impl SyncStatus {
    /// Human-readable label
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "Not started",
            Self::WaitingForState => "Waiting for session state",
            Self::InSync => "In sync",
            Self::DriftDetected => "Drift detected",
            Self::Correcting => "Correcting drift",
            Self::Seeking => "Seeking to session position",
            Self::Resyncing => "Resyncing",
            Self::ResyncFailed => "Resync failed",
            Self::Paused => "Paused",
            Self::Stopped => "Stopped",
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Everything the UI needs to render sync state
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSnapshot {
    /// Current status
    pub status: SyncStatus,
    /// A correction owns the media element
    pub correction_in_progress: bool,
    /// A non-neutral rate is applied
    pub rate_correction_active: bool,
    /// A manual resync is running
    pub resync_in_progress: bool,
    /// Latest sync quality in [0, 1]
    pub sync_quality: f64,
    /// Latest sync mode
    pub sync_mode: SyncMode,
    /// Network stability in [0.1, 1]
    pub network_stability: f64,
    /// Latest signed drift (seconds)
    pub last_drift: Option<f64>,
    /// Smoothed clock offset (ms)
    pub offset_ms: f64,
    /// Current poll interval
    #[serde(serialize_with = "serialize_millis")]
    pub poll_interval: Duration,
    /// Resync counters
    pub stats: ResyncStats,
}

impl Default for SyncSnapshot {
    fn default() -> Self {
        Self {
            status: SyncStatus::Idle,
            correction_in_progress: false,
            rate_correction_active: false,
            resync_in_progress: false,
            sync_quality: 1.0,
            sync_mode: SyncMode::Normal,
            network_stability: 1.0,
            last_drift: None,
            offset_ms: 0.0,
            poll_interval: Duration::ZERO,
            stats: ResyncStats::default(),
        }
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}
