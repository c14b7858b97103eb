//! Manual resynchronization
//!
//! A resync takes the media element away from the correction engine,
//! optionally refreshes the clock offset, then asks the session for its
//! state and seeks straight to the expected position. Failed attempts are
//! retried with backoff; when every attempt fails the last known state is
//! used for a best-effort seek before the failure is reported.

use std::time::Duration;

use crate::clock::{LocalClock, OffsetEstimator, refresh_offset};
use crate::correction::{CorrectionEngine, NoopReason};
use crate::drift::DriftSampler;
use crate::error::{Result, SyncError};
use crate::network::NetworkQualityMonitor;
use crate::runtime::Runtime;
use crate::session::{MediaElement, SessionTransport, TimeSource};
use crate::types::{CanonicalState, OffsetConfig, ResyncConfig};

use super::ledger::{AttemptResult, ResyncAttempt, ResyncLedger, ResyncStats};
use super::retry::RetryPolicy;

/// Everything a resync touches, borrowed from the owning session
pub struct ResyncContext<'a> {
    /// Session to resync with
    pub session_id: &'a str,
    /// Canonical state provider
    pub transport: &'a dyn SessionTransport,
    /// Optional high-precision time source
    pub time_source: Option<&'a dyn TimeSource>,
    /// Local clock
    pub clock: &'a dyn LocalClock,
    /// Media element being synchronized
    pub media: &'a dyn MediaElement,
    /// Correction engine owning the media element
    pub engine: &'a mut CorrectionEngine,
    /// Clock offset estimator
    pub offset: &'a mut OffsetEstimator,
    /// Offset estimation settings
    pub offset_config: &'a OffsetConfig,
    /// Network quality monitor fed by offset probes
    pub network: &'a mut NetworkQualityMonitor,
    /// Expected position calculator
    pub sampler: &'a DriftSampler,
    /// Last state known to be valid, used for the fallback seek
    pub last_state: Option<&'a CanonicalState>,
    /// Timeout of each request
    pub request_timeout: Duration,
}

/// How a resync ended
#[derive(Debug, Clone, PartialEq)]
pub enum ResyncOutcome {
    /// Sought to the expected position of a freshly validated state
    Synced {
        /// Position sought to (seconds)
        expected: f64,
        /// Signed drift that was corrected (seconds)
        drift: f64,
        /// Attempts used
        attempts: u32,
        /// The validated state
        state: CanonicalState,
    },
    /// Every attempt failed
    Failed {
        /// Attempts used
        attempts: u32,
        /// Whether the last known state was used for a best-effort seek
        fallback_applied: bool,
        /// Last error
        reason: String,
    },
    /// The resync did not start
    Skipped(NoopReason),
}

impl ResyncOutcome {
    /// Whether a fresh state was obtained and applied
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Synced { .. })
    }
}

/// Result of a successful attempt
#[derive(Debug, Clone)]
struct AttemptSuccess {
    state: CanonicalState,
    expected: f64,
    drift_before: f64,
    drift_after: f64,
}

/// Single-flight resync with retries and history
#[derive(Debug, Clone)]
pub struct ResyncCoordinator {
    config: ResyncConfig,
    policy: RetryPolicy,
    ledger: ResyncLedger,
    last_resync_at: Option<f64>,
}

impl ResyncCoordinator {
    /// Create a coordinator
    #[must_use]
    pub fn new(config: &ResyncConfig) -> Self {
        Self {
            config: config.clone(),
            policy: RetryPolicy::from_config(config),
            ledger: ResyncLedger::new(config.history_capacity),
            last_resync_at: None,
        }
    }

    /// Attempt log and counters
    #[must_use]
    pub fn ledger(&self) -> &ResyncLedger {
        &self.ledger
    }

    /// Cumulative counters
    #[must_use]
    pub fn stats(&self) -> ResyncStats {
        self.ledger.stats()
    }

    /// Milliseconds until another resync may start
    #[must_use]
    pub fn cooldown_remaining(&self, now_ms: f64) -> Option<f64> {
        let since = self.last_resync_at?;
        let left = self.config.cooldown.as_secs_f64() * 1000.0 - (now_ms - since);
        (left > 0.0).then_some(left)
    }

    /// Run a resync
    pub async fn resync(&mut self, ctx: ResyncContext<'_>) -> ResyncOutcome {
        let ResyncContext {
            session_id,
            transport,
            time_source,
            clock,
            media,
            engine,
            offset,
            offset_config,
            network,
            sampler,
            last_state,
            request_timeout,
        } = ctx;

        let started = clock.now_ms();
        if let Some(remaining_ms) = self.cooldown_remaining(started) {
            tracing::debug!(remaining_ms, "Resync: cooling down");
            return ResyncOutcome::Skipped(NoopReason::CoolingDown { remaining_ms });
        }
        if !engine.begin_resync() {
            tracing::debug!("Resync: correction in progress");
            return ResyncOutcome::Skipped(NoopReason::InProgress);
        }
        self.last_resync_at = Some(started);
        tracing::info!(session_id, "Resync: starting");

        if self.config.refresh_offset {
            match time_source {
                Some(source) => {
                    match refresh_offset(
                        source,
                        clock,
                        offset,
                        offset_config,
                        request_timeout,
                        Some(&mut *network),
                    )
                    .await
                    {
                        // One smoothing step, as for a regular tick
                        Ok(_) => {
                            offset.advance();
                        }
                        Err(e) => tracing::warn!(
                            error = %e,
                            "Resync: offset refresh failed, keeping current offset"
                        ),
                    }
                }
                None => tracing::debug!("Resync: no time source, keeping current offset"),
            }
        }

        let offset_secs = offset.offset_secs();
        let future_tolerance_ms = offset.max_offset_ms();
        let rtt_ms = network.latest_rtt();
        let owner: &CorrectionEngine = engine;
        let ledger = &mut self.ledger;
        let mut attempts = 0;

        let result = self
            .policy
            .retry(
                move |attempt| async move {
                    tracing::debug!(attempt, "Resync: requesting state");
                    let request = transport.sync_request(session_id);
                    let payload = Runtime::timeout(request_timeout, request)
                        .await??
                        .ok_or_else(|| SyncError::StaleOrMissingState {
                            reason: "session answered without a state".to_string(),
                        })?;
                    let state = CanonicalState::from_payload(&payload)?;

                    let now = clock.now_ms();
                    state
                        .check_not_future(now + offset_secs * 1000.0, future_tolerance_ms)
                        .map_err(|e| SyncError::malformed("lastUpdated", e.to_string()))?;
                    let expected = sampler.expected_position(&state, now, offset_secs, rtt_ms)?;

                    let drift_before = media.position() - expected;
                    if !owner.resync_seek(expected) {
                        return Err(SyncError::StaleOrMissingState {
                            reason: "resync lost ownership of the media element".to_string(),
                        });
                    }
                    Ok(AttemptSuccess {
                        state,
                        expected,
                        drift_before,
                        drift_after: media.position() - expected,
                    })
                },
                |info, result: &Result<AttemptSuccess>| {
                    attempts = info.attempt;
                    let (outcome, drift_before, drift_after) = match result {
                        Ok(success) => (
                            AttemptResult::Success,
                            Some(success.drift_before),
                            Some(success.drift_after),
                        ),
                        Err(e) => {
                            tracing::warn!(
                                attempt = info.attempt,
                                error = %e,
                                "Resync: attempt failed"
                            );
                            (AttemptResult::from_error(e), None, None)
                        }
                    };
                    ledger.record_attempt(ResyncAttempt {
                        attempt_number: info.attempt,
                        requested_at: clock.now_ms() - info.elapsed.as_secs_f64() * 1000.0,
                        result: outcome,
                        drift_before,
                        drift_after,
                    });
                },
            )
            .await;

        let outcome = match result {
            Ok(success) => {
                self.ledger.record_resync(Some(success.drift_before));
                tracing::info!(
                    attempts,
                    expected = success.expected,
                    drift = success.drift_before,
                    "Resync: synced"
                );
                ResyncOutcome::Synced {
                    expected: success.expected,
                    drift: success.drift_before,
                    attempts,
                    state: success.state,
                }
            }
            Err(e) => {
                let fallback_applied = last_state.is_some_and(|state| {
                    match sampler.expected_position(state, clock.now_ms(), offset_secs, rtt_ms) {
                        Ok(expected) => engine.resync_seek(expected),
                        Err(err) => {
                            tracing::warn!(error = %err, "Resync: fallback state unusable");
                            false
                        }
                    }
                });
                self.ledger.record_resync(None);
                tracing::warn!(attempts, fallback_applied, error = %e, "Resync: failed");
                ResyncOutcome::Failed {
                    attempts,
                    fallback_applied,
                    reason: e.to_string(),
                }
            }
        };

        engine.finish_resync(clock.now_ms());
        outcome
    }
}
