//! Tiered correction engine
//!
//! Turns an analyzed drift into at most one action on the media element.
//! The entry guards run in a fixed order: paused playback, dead band,
//! mutual exclusion, confirmation, the normal cooldown and finally the
//! emergency-seek cooldown. Large-gap and critical seeks skip the last
//! three guards but never the mutual exclusion.

use std::sync::{Arc, Mutex};

use serde::Serialize;

use super::phase::{CorrectionPhase, PhaseCell, SharedPhase, lock};
use super::tier::{CorrectionTier, SeekUrgency, classify, seek_urgency};
use super::tracker::{CorrectionOutcome, SuccessTracker};
use super::transition::{NEUTRAL_RATE, RateTransition, TransitionPlan};
use crate::drift::{AnalysisContext, DriftAnalysis, SyncMode};
use crate::session::MediaElement;
use crate::types::CorrectionConfig;

/// Why no correction was applied
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum NoopReason {
    /// Drift is inside the adaptive threshold
    WithinThreshold,
    /// Playback is paused
    Paused,
    /// Another correction or a resync owns the media element
    InProgress,
    /// The previous correction was too recent
    CoolingDown {
        /// Time left (ms)
        remaining_ms: f64,
    },
    /// Not enough consecutive over-threshold detections yet
    AwaitingConfirmation {
        /// Detections so far
        seen: u32,
        /// Detections required
        required: u32,
    },
    /// The previous emergency seek was too recent
    EmergencyCooldown {
        /// Time left (ms)
        remaining_ms: f64,
    },
}

impl std::fmt::Display for NoopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WithinThreshold => write!(f, "within_threshold"),
            Self::Paused => write!(f, "paused"),
            Self::InProgress => write!(f, "in_progress"),
            Self::CoolingDown { remaining_ms } => write!(f, "cooling_down ({remaining_ms:.0}ms)"),
            Self::AwaitingConfirmation { seen, required } => {
                write!(f, "awaiting_confirmation ({seen}/{required})")
            }
            Self::EmergencyCooldown { remaining_ms } => {
                write!(f, "emergency_cooldown ({remaining_ms:.0}ms)")
            }
        }
    }
}

/// A correction the engine started
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedCorrection {
    /// Tier chosen
    pub tier: CorrectionTier,
    /// Signed drift that triggered it (seconds)
    pub drift: f64,
    /// Rate applied or ramped toward, for rate tiers
    pub rate: Option<f64>,
    /// Position sought to, for seeks
    pub seek_target: Option<f64>,
    /// Urgency, for seeks
    pub urgency: Option<SeekUrgency>,
}

/// Result of [`CorrectionEngine::evaluate`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "decision", content = "detail", rename_all = "snake_case")]
pub enum CorrectionDecision {
    /// A correction was started
    Applied(AppliedCorrection),
    /// Nothing was done
    Skipped(NoopReason),
}

impl CorrectionDecision {
    /// Whether a correction was started
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    /// Tier of the applied correction
    #[must_use]
    pub fn tier(&self) -> Option<CorrectionTier> {
        match self {
            Self::Applied(applied) => Some(applied.tier),
            Self::Skipped(_) => None,
        }
    }

    /// Skip reason, if skipped
    #[must_use]
    pub fn noop_reason(&self) -> Option<NoopReason> {
        match self {
            Self::Applied(_) => None,
            Self::Skipped(reason) => Some(*reason),
        }
    }
}

/// Externally visible correction state
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionState {
    /// A correction or resync owns the media element
    pub in_progress: bool,
    /// A non-neutral rate is applied
    pub rate_correction_active: bool,
    /// Local time (ms) of the last correction
    pub last_correction_at: Option<f64>,
    /// Tier of the running correction
    pub active_tier: Option<CorrectionTier>,
    /// Local time (ms) at which the normal cooldown ends
    pub cooldown_until: Option<f64>,
}

/// Correction awaiting its before/after comparison
#[derive(Debug, Clone, Copy)]
struct PendingEvaluation {
    tier: CorrectionTier,
    drift_before: f64,
}

/// Rate strength for each sync mode
fn mode_strength(mode: SyncMode) -> f64 {
    match mode {
        SyncMode::Conservative => 0.8,
        SyncMode::Normal => 1.0,
        SyncMode::Aggressive => 1.2,
    }
}

/// Four-tier correction state machine
pub struct CorrectionEngine {
    config: CorrectionConfig,
    media: Arc<dyn MediaElement>,
    shared: SharedPhase,
    last_correction_at: Option<f64>,
    last_emergency_at: Option<f64>,
    consecutive_detections: u32,
    pending: Option<PendingEvaluation>,
    tracker: SuccessTracker,
    consecutive_failures: u32,
    correction_count: u64,
}

impl std::fmt::Debug for CorrectionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorrectionEngine")
            .field("phase", &self.phase())
            .field("last_correction_at", &self.last_correction_at)
            .field("consecutive_detections", &self.consecutive_detections)
            .field("success_rate", &self.tracker.rate())
            .field("correction_count", &self.correction_count)
            .finish_non_exhaustive()
    }
}

impl CorrectionEngine {
    /// Create an idle engine driving `media`
    #[must_use]
    pub fn new(config: CorrectionConfig, media: Arc<dyn MediaElement>) -> Self {
        let tracker = SuccessTracker::new(config.success_alpha);
        Self {
            config,
            media,
            shared: Arc::new(Mutex::new(PhaseCell::default())),
            last_correction_at: None,
            last_emergency_at: None,
            consecutive_detections: 0,
            pending: None,
            tracker,
            consecutive_failures: 0,
            correction_count: 0,
        }
    }

    /// Correction settings
    #[must_use]
    pub fn config(&self) -> &CorrectionConfig {
        &self.config
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> CorrectionPhase {
        lock(&self.shared).phase
    }

    /// Whether a correction or resync owns the media element
    #[must_use]
    pub fn in_progress(&self) -> bool {
        self.phase().in_progress()
    }

    /// Whether a non-neutral rate is applied
    #[must_use]
    pub fn rate_correction_active(&self) -> bool {
        self.phase().rate_correction_active()
    }

    /// Whether a manual resync owns the media element
    #[must_use]
    pub fn resync_in_progress(&self) -> bool {
        self.phase() == CorrectionPhase::Resyncing
    }

    /// Corrections applied since creation
    #[must_use]
    pub fn correction_count(&self) -> u64 {
        self.correction_count
    }

    /// Corrections in a row that did not help
    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Success tracker
    #[must_use]
    pub fn tracker(&self) -> &SuccessTracker {
        &self.tracker
    }

    /// Snapshot of the correction state at local time `now_ms`
    #[must_use]
    pub fn state(&self, now_ms: f64) -> CorrectionState {
        let phase = self.phase();
        let cooldown_ms = self.config.cooldown.as_secs_f64() * 1000.0;
        CorrectionState {
            in_progress: phase.in_progress(),
            rate_correction_active: phase.rate_correction_active(),
            last_correction_at: self.last_correction_at,
            active_tier: phase.active_tier(),
            cooldown_until: self
                .last_correction_at
                .map(|at| at + cooldown_ms)
                .filter(|until| *until > now_ms),
        }
    }

    /// Analysis inputs owned by the engine
    #[must_use]
    pub fn analysis_context(&self, network_stability: f64) -> AnalysisContext {
        AnalysisContext {
            base_threshold: self.config.base_threshold,
            network_stability,
            consecutive_failed_corrections: self.consecutive_failures,
            threshold_multiplier: self.tracker.threshold_multiplier(),
            ..AnalysisContext::default()
        }
    }

    /// Detections required before acting in `mode`
    #[must_use]
    pub fn required_detections(&self, mode: SyncMode) -> u32 {
        let base = self.config.jitter_buffer.max(1);
        match mode {
            SyncMode::Conservative => base + 1,
            SyncMode::Normal => base,
            SyncMode::Aggressive => 1,
        }
    }

    /// Decide on and start at most one correction
    ///
    /// `drift` is `local - expected` in seconds, `expected` the canonical
    /// position a seek would jump to, and `now_ms` the local clock.
    pub fn evaluate(
        &mut self,
        drift: f64,
        expected: f64,
        analysis: &DriftAnalysis,
        now_ms: f64,
    ) -> CorrectionDecision {
        let decision = self.decide(drift, expected, analysis, now_ms);
        if let CorrectionDecision::Skipped(reason) = decision {
            tracing::debug!(drift, %reason, "Correction: skipped");
        }
        decision
    }

    fn decide(
        &mut self,
        drift: f64,
        expected: f64,
        analysis: &DriftAnalysis,
        now_ms: f64,
    ) -> CorrectionDecision {
        let magnitude = drift.abs();

        if !self.media.is_playing() {
            self.consecutive_detections = 0;
            return CorrectionDecision::Skipped(NoopReason::Paused);
        }
        if magnitude <= analysis.adaptive_threshold {
            self.consecutive_detections = 0;
            return CorrectionDecision::Skipped(NoopReason::WithinThreshold);
        }
        if self.in_progress() {
            return CorrectionDecision::Skipped(NoopReason::InProgress);
        }

        let urgency = seek_urgency(magnitude, &self.config);
        let bypass = urgency.is_some_and(SeekUrgency::bypasses_guards);

        if !bypass {
            self.consecutive_detections = self.consecutive_detections.saturating_add(1);
            let required = self.required_detections(analysis.sync_mode);
            if self.consecutive_detections < required {
                return CorrectionDecision::Skipped(NoopReason::AwaitingConfirmation {
                    seen: self.consecutive_detections,
                    required,
                });
            }
            if let Some(remaining_ms) =
                remaining(self.last_correction_at, self.config.cooldown, now_ms)
            {
                return CorrectionDecision::Skipped(NoopReason::CoolingDown { remaining_ms });
            }
            if urgency.is_some() {
                if let Some(remaining_ms) =
                    remaining(self.last_emergency_at, self.config.emergency_cooldown, now_ms)
                {
                    return CorrectionDecision::Skipped(NoopReason::EmergencyCooldown {
                        remaining_ms,
                    });
                }
            }
        }

        let applied = self.apply(drift, expected, analysis.sync_mode, urgency);
        self.last_correction_at = Some(now_ms);
        if urgency.is_some() {
            self.last_emergency_at = Some(now_ms);
        }
        self.consecutive_detections = 0;
        self.correction_count += 1;
        self.pending = Some(PendingEvaluation {
            tier: applied.tier,
            drift_before: magnitude,
        });

        tracing::info!(
            tier = %applied.tier,
            drift,
            rate = ?applied.rate,
            seek_target = ?applied.seek_target,
            urgency = ?applied.urgency,
            mode = %analysis.sync_mode,
            "Correction: applied"
        );
        CorrectionDecision::Applied(applied)
    }

    /// Cancel whatever runs, restore neutral, and start the new tier
    fn apply(
        &self,
        drift: f64,
        expected: f64,
        mode: SyncMode,
        urgency: Option<SeekUrgency>,
    ) -> AppliedCorrection {
        let magnitude = drift.abs();
        let tier = classify(magnitude, &self.config);
        let c = &self.config;

        let mut cell = lock(&self.shared);
        cell.cancel_active();
        self.neutralize();

        let (plan, phase, rate, seek_target) = match tier {
            CorrectionTier::Micro => {
                let rate = self.clamp_rate(
                    NEUTRAL_RATE - (drift * c.micro_gain).clamp(-c.micro_rate_cap, c.micro_rate_cap),
                );
                self.media.set_playback_rate(rate);
                (
                    TransitionPlan::Revert {
                        hold: c.micro_duration,
                    },
                    CorrectionPhase::MicroCorrecting { rate },
                    Some(rate),
                    None,
                )
            }
            CorrectionTier::Rate | CorrectionTier::ExtendedRate => {
                let (horizon, gentleness, hold) = if tier == CorrectionTier::Rate {
                    (c.rate_duration, 1.0, c.rate_duration)
                } else {
                    (c.extended_duration, c.extended_gentleness, c.extended_duration)
                };
                let horizon_secs = horizon.as_secs_f64().max(f64::EPSILON);
                let target = self.clamp_rate(
                    NEUTRAL_RATE - (drift / horizon_secs) * mode_strength(mode) * gentleness,
                );
                (
                    TransitionPlan::Ramp {
                        tier,
                        target,
                        steps: c.transition_steps,
                        step_interval: c.transition_step_interval,
                        hold,
                    },
                    CorrectionPhase::rate_phase(tier, NEUTRAL_RATE, true),
                    Some(target),
                    None,
                )
            }
            CorrectionTier::EmergencySeek => {
                self.media.seek(expected);
                (
                    TransitionPlan::Settle {
                        settle: c.seek_settle,
                    },
                    CorrectionPhase::EmergencySeeking { target: expected },
                    None,
                    Some(expected),
                )
            }
        };

        cell.phase = phase;
        cell.active = Some(RateTransition::spawn(
            plan,
            self.media.clone(),
            self.shared.clone(),
        ));

        AppliedCorrection {
            tier,
            drift,
            rate,
            seek_target,
            urgency,
        }
    }

    fn clamp_rate(&self, rate: f64) -> f64 {
        rate.clamp(self.config.min_rate, self.config.max_rate)
    }

    /// Restore the neutral rate if anything else is applied
    fn neutralize(&self) {
        if (self.media.playback_rate() - NEUTRAL_RATE).abs() > f64::EPSILON {
            self.media.set_playback_rate(NEUTRAL_RATE);
        }
    }

    /// Compare the pending correction against a fresh drift magnitude
    ///
    /// Nothing happens until the correction has finished. The outcome feeds
    /// the success tracker and the failure counter.
    pub fn record_observation(&mut self, drift_magnitude: f64) -> Option<CorrectionOutcome> {
        if self.phase() != CorrectionPhase::Idle {
            return None;
        }
        let pending = self.pending.take()?;
        let outcome =
            CorrectionOutcome::evaluate(pending.tier, pending.drift_before, drift_magnitude);
        let rate = self.tracker.record(outcome.success);
        if outcome.success {
            self.consecutive_failures = 0;
        } else {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        }
        tracing::debug!(
            tier = %outcome.tier,
            before = outcome.drift_before,
            after = outcome.drift_after,
            success = outcome.success,
            success_rate = rate,
            "Correction: outcome"
        );
        Some(outcome)
    }

    /// Take exclusive ownership of the media element for a resync
    ///
    /// Returns false when a correction or another resync is in progress. A
    /// holding rate correction is cancelled and the rate neutralized.
    pub fn begin_resync(&mut self) -> bool {
        let mut cell = lock(&self.shared);
        if cell.phase.in_progress() {
            return false;
        }
        cell.cancel_active();
        self.neutralize();
        cell.phase = CorrectionPhase::Resyncing;
        self.consecutive_detections = 0;
        self.pending = None;
        true
    }

    /// Seek as part of a resync, bypassing tier classification
    ///
    /// Ignored unless [`Self::begin_resync`] succeeded first.
    pub fn resync_seek(&self, target: f64) -> bool {
        let cell = lock(&self.shared);
        if cell.phase != CorrectionPhase::Resyncing {
            return false;
        }
        self.media.seek(target);
        true
    }

    /// Release the media element after a resync
    ///
    /// The normal cooldown restarts at `now_ms`.
    pub fn finish_resync(&mut self, now_ms: f64) {
        let mut cell = lock(&self.shared);
        if cell.phase == CorrectionPhase::Resyncing {
            cell.phase = CorrectionPhase::Idle;
            self.last_correction_at = Some(now_ms);
        }
    }

    /// Cancel everything and forget correction history
    ///
    /// Used on track change and teardown; the rate is neutral afterwards.
    pub fn reset(&mut self) {
        {
            let mut cell = lock(&self.shared);
            cell.cancel_active();
            self.neutralize();
            cell.phase = CorrectionPhase::Idle;
        }
        self.last_correction_at = None;
        self.last_emergency_at = None;
        self.consecutive_detections = 0;
        self.pending = None;
        self.tracker.reset();
        self.consecutive_failures = 0;
    }
}

impl Drop for CorrectionEngine {
    fn drop(&mut self) {
        let mut cell = lock(&self.shared);
        cell.cancel_active();
        self.neutralize();
        cell.phase = CorrectionPhase::Idle;
    }
}

/// Milliseconds left of a cooldown started at `since`
fn remaining(since: Option<f64>, cooldown: std::time::Duration, now_ms: f64) -> Option<f64> {
    let since = since?;
    let left = cooldown.as_secs_f64() * 1000.0 - (now_ms - since);
    (left > 0.0).then_some(left)
}
