//! Collaborator interfaces
//!
//! The core never talks to a network or an audio device directly. The
//! session transport and the canonical time source are async request/reply
//! peers; the media element is a local object with interior mutability.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

/// Request/callback channel to the shared session
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Ask for the current canonical state
    ///
    /// `Ok(None)` means the peer answered without a state.
    async fn sync_request(&self, session_id: &str) -> Result<Option<Value>>;

    /// Emit drift telemetry; delivery is best-effort
    async fn drift_report(&self, report: DriftReport) -> Result<()>;
}

/// High-precision canonical time source
#[async_trait]
pub trait TimeSource: Send + Sync {
    /// Round-trip `client_sent` (local ms) and return
    /// `(server_time, server_received)` in server ms
    async fn time_sync(&self, client_sent: f64) -> Result<(f64, f64)>;
}

/// Local media element being kept in sync
///
/// Positions are in seconds. Implementations must be cheap to call; the
/// engine calls them while holding its phase lock.
pub trait MediaElement: Send + Sync {
    /// Current playback position
    fn position(&self) -> f64;

    /// Whether playback is running
    fn is_playing(&self) -> bool;

    /// Current playback rate (1.0 is neutral)
    fn playback_rate(&self) -> f64;

    /// Change the playback rate
    fn set_playback_rate(&self, rate: f64);

    /// Jump to a position
    fn seek(&self, position: f64);

    /// Output latency reported by the audio device, if known
    fn output_latency(&self) -> Option<Duration> {
        None
    }
}

/// Drift telemetry record sent to the session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftReport {
    /// Session the sample belongs to
    pub session_id: String,
    /// Signed drift (seconds, positive when ahead)
    pub drift: f64,
    /// Expected canonical position (seconds)
    pub expected: f64,
    /// Local position (seconds)
    pub current: f64,
    /// Reporting client
    pub client_id: String,
    /// Local time of the sample (ms)
    pub timestamp: f64,
    /// Analysis details
    pub extra: Value,
}
