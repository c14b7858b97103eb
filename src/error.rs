use thiserror::Error;

/// Errors that can occur while synchronizing playback
///
/// Only failures that a caller can act on are errors. A correction that is
/// skipped because another one is running, or one that did not reduce drift,
/// is reported through [`crate::correction::NoopReason`] and
/// [`crate::correction::CorrectionOutcome`] instead.
#[derive(Debug, Error)]
pub enum SyncError {
    // ===== Sample Errors =====
    /// A timing sample or offset was non-finite or out of range
    #[error("invalid sample: {reason}")]
    InvalidSample {
        /// Why the sample was rejected
        reason: String,
    },

    // ===== State Errors =====
    /// No usable canonical state is available
    #[error("canonical state unavailable: {reason}")]
    StaleOrMissingState {
        /// Why no state could be used
        reason: String,
    },

    /// Canonical state payload failed structural validation
    #[error("malformed canonical state: {field} - {reason}")]
    MalformedState {
        /// The offending field
        field: String,
        /// What was wrong with it
        reason: String,
    },

    // ===== Transport Errors =====
    /// The session transport failed to deliver a request
    #[error("transport failure: {message}")]
    TransportFailure {
        /// Description of the failure
        message: String,
        /// The underlying source of the error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A transport request did not complete in time
    #[error("request timed out after {duration:?}")]
    Timeout {
        /// The timeout that elapsed
        duration: std::time::Duration,
    },

    // ===== Configuration Errors =====
    /// Invalid parameter provided
    #[error("invalid parameter: {name} - {message}")]
    InvalidParameter {
        /// The name of the parameter
        name: String,
        /// Description of the error
        message: String,
    },
}

impl SyncError {
    /// Check if this error is recoverable by retrying
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::TransportFailure { .. }
                | Self::Timeout { .. }
                | Self::MalformedState { .. }
                | Self::StaleOrMissingState { .. }
        )
    }

    /// Check if this error describes a discarded sample
    #[must_use]
    pub fn is_invalid_sample(&self) -> bool {
        matches!(self, Self::InvalidSample { .. })
    }

    pub(crate) fn invalid_sample(reason: impl Into<String>) -> Self {
        Self::InvalidSample {
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedState {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for synchronization operations
pub type Result<T> = std::result::Result<T, SyncError>;
