//! # playsync
//!
//! Client-side playback synchronization for shared listening sessions.
//!
//! Several clients play the same track while one session server owns the
//! canonical position. Each client runs a [`SyncSession`] that keeps its
//! local media element within a few tens of milliseconds of that position.
//!
//! ## Features
//!
//! - Clock offset estimation with bounded, stepwise smoothing
//! - Drift sampling with output latency and one-way delay compensation
//! - Trend, velocity and prediction analysis with adaptive thresholds
//! - Network quality tracking and adaptive poll intervals
//! - Four-tier correction: micro nudges, rate ramps, extended ramps and seeks
//! - Manual resync with retry, backoff and a best-effort fallback
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use playsync::testing::{MockMediaElement, MockTransport};
//! use playsync::{SyncConfig, SyncSession};
//!
//! # async fn example() -> Result<(), playsync::SyncError> {
//! let transport = Arc::new(MockTransport::new());
//! let media = Arc::new(MockMediaElement::new(0.0, true));
//!
//! let session = SyncSession::builder("living-room", transport.clone(), media)
//!     .time_source(transport)
//!     .config(SyncConfig::default())
//!     .build()?;
//!
//! session.start().await;
//! // Feed pushed `sync_state` payloads as they arrive
//! // session.on_sync_state(&payload).await?;
//! session.stop().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - **Session**: [`SyncSession`] owns the loop, the poll timer and the
//!   published status
//! - **Control**: [`correction`] and [`resync`] own every write to the media
//!   element
//! - **Measurement**: [`clock`], [`drift`], [`network`] and [`scheduler`]
//!   are plain state machines driven by the session

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Public modules
/// Error types
pub mod error;
/// Core types
pub mod types;

pub mod clock;
pub mod correction;
pub mod drift;
pub mod network;
pub mod resync;
pub mod scheduler;
pub mod session;

/// Testing utilities
pub mod testing;

mod runtime;

// Re-exports
pub use clock::{LocalClock, ManualClock, OffsetEstimator, SystemClock};
pub use correction::{
    CorrectionDecision, CorrectionEngine, CorrectionPhase, CorrectionTier, NoopReason,
};
pub use drift::{DriftAnalysis, DriftAnalyzer, DriftSampler, SyncMode};
pub use error::{Result, SyncError};
pub use network::{NetworkQuality, NetworkQualityMonitor, QualityBand};
pub use resync::{ResyncAttempt, ResyncCoordinator, ResyncOutcome, ResyncStats};
pub use scheduler::{AdaptiveScheduler, PollTimer};
pub use session::{
    DriftReport, MediaElement, SessionTransport, SyncSession, SyncSessionBuilder, SyncSnapshot,
    SyncStatus, TickOutcome, TimeSource,
};
pub use types::{CanonicalState, CorrectionProfile, SyncConfig, SyncConfigBuilder};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude for common imports
///
/// Convenient re-exports
pub mod prelude {
    pub use crate::{
        CanonicalState, MediaElement, SessionTransport, SyncConfig, SyncError, SyncSession,
        SyncSnapshot, SyncStatus, TimeSource,
    };
}
