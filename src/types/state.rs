use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SyncError};

/// Authoritative session position as of a known server time
///
/// Supplied by the session transport, either in reply to a state request or
/// as a proactive push. Positions are in seconds, timestamps in server
/// milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalState {
    /// Whether the group is playing
    pub is_playing: bool,
    /// Position (seconds) at `last_updated_at`
    pub position_at_timestamp: f64,
    /// Server time (ms) at which the position was recorded
    pub last_updated_at: f64,
    /// Track the position belongs to
    pub track_id: Option<String>,
    /// Server time (ms) at which the payload was sent, when provided
    pub server_time: Option<f64>,
}

/// Wire shape of a `sync_state` payload before validation
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawState {
    is_playing: Option<bool>,
    timestamp: Option<f64>,
    last_updated: Option<f64>,
    #[serde(default)]
    track_id: Option<Value>,
    #[serde(default)]
    server_time: Option<f64>,
}

impl CanonicalState {
    /// Create a state directly (positions in seconds, times in server ms)
    #[must_use]
    pub fn new(is_playing: bool, position_at_timestamp: f64, last_updated_at: f64) -> Self {
        Self {
            is_playing,
            position_at_timestamp,
            last_updated_at,
            track_id: None,
            server_time: None,
        }
    }

    /// Attach a track id
    #[must_use]
    pub fn with_track(mut self, track_id: impl Into<String>) -> Self {
        self.track_id = Some(track_id.into());
        self
    }

    /// Attach the server send time
    #[must_use]
    pub fn with_server_time(mut self, server_time: f64) -> Self {
        self.server_time = Some(server_time);
        self
    }

    /// Parse and structurally validate a transport payload
    ///
    /// Required keys are `isPlaying`, `timestamp` and `lastUpdated`;
    /// `trackId` (string or number) and `serverTime` are optional.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::MalformedState` naming the first invalid field.
    pub fn from_payload(payload: &Value) -> Result<Self> {
        if !payload.is_object() {
            return Err(SyncError::malformed("payload", "expected an object"));
        }
        let raw: RawState = serde_json::from_value(payload.clone())
            .map_err(|e| SyncError::malformed("payload", e.to_string()))?;

        let is_playing = raw
            .is_playing
            .ok_or_else(|| SyncError::malformed("isPlaying", "missing"))?;
        let position = raw
            .timestamp
            .ok_or_else(|| SyncError::malformed("timestamp", "missing"))?;
        let last_updated = raw
            .last_updated
            .ok_or_else(|| SyncError::malformed("lastUpdated", "missing"))?;

        let track_id = match raw.track_id {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(_) => return Err(SyncError::malformed("trackId", "expected string or number")),
        };

        let state = Self {
            is_playing,
            position_at_timestamp: position,
            last_updated_at: last_updated,
            track_id,
            server_time: raw.server_time,
        };
        state.validate()?;
        Ok(state)
    }

    /// Check field ranges and internal timestamp consistency
    ///
    /// # Errors
    ///
    /// Returns `SyncError::MalformedState` for non-finite or negative values,
    /// or a `lastUpdated` later than the payload's own `serverTime`.
    pub fn validate(&self) -> Result<()> {
        check_non_negative("timestamp", self.position_at_timestamp)?;
        check_non_negative("lastUpdated", self.last_updated_at)?;
        if let Some(server_time) = self.server_time {
            check_non_negative("serverTime", server_time)?;
            if self.last_updated_at > server_time {
                return Err(SyncError::malformed(
                    "lastUpdated",
                    "later than serverTime in the same payload",
                ));
            }
        }
        Ok(())
    }

    /// Check that the state is not from the future
    ///
    /// `server_now_ms` is the local clock translated to server time;
    /// `tolerance_ms` absorbs residual offset error.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::InvalidSample` when `lastUpdated` is ahead of now.
    pub fn check_not_future(&self, server_now_ms: f64, tolerance_ms: f64) -> Result<()> {
        if self.last_updated_at > server_now_ms + tolerance_ms {
            return Err(SyncError::invalid_sample(format!(
                "lastUpdated {:.0} is {:.0}ms ahead of now",
                self.last_updated_at,
                self.last_updated_at - server_now_ms
            )));
        }
        Ok(())
    }

    /// Whether this state belongs to `track_id`
    ///
    /// States without a track id match any track.
    #[must_use]
    pub fn is_for_track(&self, track_id: Option<&str>) -> bool {
        match (&self.track_id, track_id) {
            (Some(ours), Some(theirs)) => ours == theirs,
            _ => true,
        }
    }
}

fn check_non_negative(field: &str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(SyncError::malformed(field, "not finite"));
    }
    if value < 0.0 {
        return Err(SyncError::malformed(field, "negative"));
    }
    Ok(())
}
