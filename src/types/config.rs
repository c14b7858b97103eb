use std::time::Duration;

use crate::error::SyncError;

/// Preset correction tuning
///
/// Two tunings of the same control loop exist in the field: a conservative
/// one with a wide dead band and a two-sample jitter buffer, and a responsive
/// one that corrects smaller drift after a single confirming observation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CorrectionProfile {
    /// 120 ms dead band, two confirming detections (default)
    #[default]
    Conservative,
    /// 50 ms dead band, one confirming detection
    Responsive,
}

impl CorrectionProfile {
    /// Base drift threshold in seconds
    #[must_use]
    pub fn base_threshold(self) -> f64 {
        match self {
            Self::Conservative => 0.12,
            Self::Responsive => 0.05,
        }
    }

    /// Consecutive over-threshold detections required before acting
    #[must_use]
    pub fn jitter_buffer(self) -> u32 {
        match self {
            Self::Conservative => 2,
            Self::Responsive => 1,
        }
    }
}

/// Clock offset estimation settings
#[derive(Debug, Clone)]
pub struct OffsetConfig {
    /// Largest accepted offset magnitude (default: 1 second)
    pub max_offset: Duration,
    /// Offset change above which smoothing kicks in (default: 50ms)
    pub smoothing_threshold: Duration,
    /// Number of equal steps used to reach a distant target (default: 5)
    pub smoothing_steps: u32,
    /// Minimum valid samples needed for a batch estimate (default: 3)
    pub min_batch_samples: usize,
    /// Probes sent per batch refresh (default: 5)
    pub batch_size: usize,
    /// Pause between probes of a batch (default: 50ms)
    pub batch_spacing: Duration,
    /// How often the session refreshes the offset (default: 30 seconds)
    pub refresh_interval: Duration,
}

impl Default for OffsetConfig {
    fn default() -> Self {
        Self {
            max_offset: Duration::from_secs(1),
            smoothing_threshold: Duration::from_millis(50),
            smoothing_steps: 5,
            min_batch_samples: 3,
            batch_size: 5,
            batch_spacing: Duration::from_millis(50),
            refresh_interval: Duration::from_secs(30),
        }
    }
}

/// Drift sampling and analysis settings
#[derive(Debug, Clone)]
pub struct DriftConfig {
    /// Ring buffer capacity for drift samples (default: 20)
    pub history_capacity: usize,
    /// Output latency used when the device cannot report one (default: 80ms)
    pub default_output_latency: Duration,
    /// Add half the measured RTT to the expected position (default: true)
    pub compensate_one_way_delay: bool,
    /// How long the last canonical state stays usable without a fresh poll
    /// (default: 10 seconds)
    pub state_max_age: Duration,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            history_capacity: 20,
            default_output_latency: Duration::from_millis(80),
            compensate_one_way_delay: true,
            state_max_age: Duration::from_secs(10),
        }
    }
}

/// Network quality tracking settings
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// RTT samples retained (default: 10)
    pub rtt_history_capacity: usize,
    /// Consecutive lost probes before stability decays (default: 3)
    pub loss_streak_threshold: u32,
    /// Stability multiplier applied per lost probe past the streak (default: 0.8)
    pub loss_decay: f64,
    /// Timeout for a single probe or state request (default: 3 seconds)
    pub probe_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            rtt_history_capacity: 10,
            loss_streak_threshold: 3,
            loss_decay: 0.8,
            probe_timeout: Duration::from_secs(3),
        }
    }
}

/// Poll interval settings
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval when stability > 0.8 (default: 1500ms)
    pub excellent_interval: Duration,
    /// Interval when stability > 0.6 (default: 1000ms)
    pub good_interval: Duration,
    /// Interval when stability > 0.4 (default: 800ms)
    pub fair_interval: Duration,
    /// Interval otherwise (default: 600ms)
    pub poor_interval: Duration,
    /// Lower clamp (default: 500ms)
    pub min_interval: Duration,
    /// Upper clamp (default: 3000ms)
    pub max_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            excellent_interval: Duration::from_millis(1500),
            good_interval: Duration::from_millis(1000),
            fair_interval: Duration::from_millis(800),
            poor_interval: Duration::from_millis(600),
            min_interval: Duration::from_millis(500),
            max_interval: Duration::from_millis(3000),
        }
    }
}

/// Tiered correction settings
///
/// All drift values are in seconds.
#[derive(Debug, Clone)]
pub struct CorrectionConfig {
    /// Dead band before any correction is considered
    pub base_threshold: f64,
    /// Consecutive confirming detections in normal mode
    pub jitter_buffer: u32,
    /// Minimum spacing between corrections (default: 1500ms)
    pub cooldown: Duration,
    /// Upper bound of the micro tier (default: 0.04)
    pub micro_max_drift: f64,
    /// Rate gain per second of drift in the micro tier (default: 0.7)
    pub micro_gain: f64,
    /// Largest rate deviation of a micro nudge (default: 0.03)
    pub micro_rate_cap: f64,
    /// Micro nudge duration (default: 250ms)
    pub micro_duration: Duration,
    /// Upper bound of the rate tier (default: 0.25)
    pub rate_max_drift: f64,
    /// Rate tier hold duration; also the horizon drift is spread over (default: 2000ms)
    pub rate_duration: Duration,
    /// Extended tier hold duration (default: 3000ms)
    pub extended_duration: Duration,
    /// Extended tier multiplier (default: 0.7)
    pub extended_gentleness: f64,
    /// Drift at which the engine seeks instead of nudging (default: 1.0)
    pub emergency_threshold: f64,
    /// Drift that bypasses jitter buffer and cooldowns (default: 5.0)
    pub large_gap_threshold: f64,
    /// Drift treated as a critical emergency (default: 10.0)
    pub critical_threshold: f64,
    /// Minimum spacing between standard emergency seeks (default: 10 seconds)
    pub emergency_cooldown: Duration,
    /// Settle window after a seek (default: 500ms)
    pub seek_settle: Duration,
    /// Lowest playback rate ever applied (default: 0.5)
    pub min_rate: f64,
    /// Highest playback rate ever applied (default: 2.0)
    pub max_rate: f64,
    /// Steps in a gradual rate ramp (default: 5)
    pub transition_steps: u32,
    /// Delay between ramp steps (default: 40ms)
    pub transition_step_interval: Duration,
    /// Smoothing factor of the success-rate tracker (default: 0.3)
    pub success_alpha: f64,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        let profile = CorrectionProfile::default();
        Self {
            base_threshold: profile.base_threshold(),
            jitter_buffer: profile.jitter_buffer(),
            cooldown: Duration::from_millis(1500),
            micro_max_drift: 0.04,
            micro_gain: 0.7,
            micro_rate_cap: 0.03,
            micro_duration: Duration::from_millis(250),
            rate_max_drift: 0.25,
            rate_duration: Duration::from_millis(2000),
            extended_duration: Duration::from_millis(3000),
            extended_gentleness: 0.7,
            emergency_threshold: 1.0,
            large_gap_threshold: 5.0,
            critical_threshold: 10.0,
            emergency_cooldown: Duration::from_secs(10),
            seek_settle: Duration::from_millis(500),
            min_rate: 0.5,
            max_rate: 2.0,
            transition_steps: 5,
            transition_step_interval: Duration::from_millis(40),
            success_alpha: 0.3,
        }
    }
}

/// Manual resynchronization settings
#[derive(Debug, Clone)]
pub struct ResyncConfig {
    /// Minimum spacing between resyncs (default: 2000ms)
    pub cooldown: Duration,
    /// Attempts before falling back (default: 3)
    pub max_attempts: u32,
    /// Backoff base; failed attempt `n` (1-based) waits `base * 2^(n-1)`
    /// plus jitter (default: 250ms)
    pub backoff_base: Duration,
    /// Upper bound of the random jitter added to each backoff (default: 100ms)
    pub backoff_jitter: Duration,
    /// Refresh the clock offset before requesting state (default: true)
    pub refresh_offset: bool,
    /// Attempt entries kept for display (default: 5)
    pub history_capacity: usize,
}

impl Default for ResyncConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_millis(2000),
            max_attempts: 3,
            backoff_base: Duration::from_millis(250),
            backoff_jitter: Duration::from_millis(100),
            refresh_offset: true,
            history_capacity: 5,
        }
    }
}

/// Configuration for a synchronization session
#[derive(Debug, Clone, Default)]
pub struct SyncConfig {
    /// Active correction preset
    pub profile: CorrectionProfile,
    /// Offset estimation
    pub offset: OffsetConfig,
    /// Drift sampling and analysis
    pub drift: DriftConfig,
    /// Network quality tracking
    pub network: NetworkConfig,
    /// Poll interval computation
    pub scheduler: SchedulerConfig,
    /// Tiered correction
    pub correction: CorrectionConfig,
    /// Manual resynchronization
    pub resync: ResyncConfig,
}

impl SyncConfig {
    /// Create a new config builder
    #[must_use]
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::default()
    }

    /// Check that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns `SyncError::InvalidParameter` naming the first offending field.
    pub fn validate(&self) -> Result<(), SyncError> {
        let c = &self.correction;
        let tiers = [
            ("correction.micro_max_drift", c.micro_max_drift),
            ("correction.rate_max_drift", c.rate_max_drift),
            ("correction.emergency_threshold", c.emergency_threshold),
            ("correction.large_gap_threshold", c.large_gap_threshold),
            ("correction.critical_threshold", c.critical_threshold),
        ];
        for pair in tiers.windows(2) {
            if pair[0].1.partial_cmp(&pair[1].1) != Some(std::cmp::Ordering::Less) {
                return Err(invalid(pair[1].0, "tier boundaries must be strictly increasing"));
            }
        }
        if !(c.base_threshold.is_finite() && c.base_threshold > 0.0) {
            return Err(invalid("correction.base_threshold", "must be positive"));
        }
        if c.min_rate <= 0.0 || c.min_rate >= 1.0 || c.max_rate <= 1.0 {
            return Err(invalid("correction.min_rate", "rate bounds must enclose 1.0"));
        }
        if c.jitter_buffer == 0 {
            return Err(invalid("correction.jitter_buffer", "must be at least 1"));
        }
        if self.drift.history_capacity == 0 {
            return Err(invalid("drift.history_capacity", "must be non-zero"));
        }
        if self.network.rtt_history_capacity == 0 {
            return Err(invalid("network.rtt_history_capacity", "must be non-zero"));
        }
        if self.offset.smoothing_steps == 0 {
            return Err(invalid("offset.smoothing_steps", "must be non-zero"));
        }
        if self.scheduler.min_interval > self.scheduler.max_interval {
            return Err(invalid(
                "scheduler.min_interval",
                "must not exceed scheduler.max_interval",
            ));
        }
        if self.resync.max_attempts == 0 {
            return Err(invalid("resync.max_attempts", "must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(name: &str, message: &str) -> SyncError {
    SyncError::InvalidParameter {
        name: name.to_string(),
        message: message.to_string(),
    }
}

/// Builder for `SyncConfig`
#[derive(Debug, Clone, Default)]
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    /// Select a correction preset (rewrites threshold and jitter buffer)
    #[must_use]
    pub fn profile(mut self, profile: CorrectionProfile) -> Self {
        self.config.profile = profile;
        self.config.correction.base_threshold = profile.base_threshold();
        self.config.correction.jitter_buffer = profile.jitter_buffer();
        self
    }

    /// Override the base drift threshold (seconds)
    #[must_use]
    pub fn base_threshold(mut self, threshold: f64) -> Self {
        self.config.correction.base_threshold = threshold;
        self
    }

    /// Override the jitter buffer length
    #[must_use]
    pub fn jitter_buffer(mut self, detections: u32) -> Self {
        self.config.correction.jitter_buffer = detections;
        self
    }

    /// Set the minimum spacing between corrections
    #[must_use]
    pub fn correction_cooldown(mut self, cooldown: Duration) -> Self {
        self.config.correction.cooldown = cooldown;
        self
    }

    /// Set the fallback output latency
    #[must_use]
    pub fn default_output_latency(mut self, latency: Duration) -> Self {
        self.config.drift.default_output_latency = latency;
        self
    }

    /// Enable or disable one-way delay compensation
    #[must_use]
    pub fn compensate_one_way_delay(mut self, enable: bool) -> Self {
        self.config.drift.compensate_one_way_delay = enable;
        self
    }

    /// Set the probe and request timeout
    #[must_use]
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.config.network.probe_timeout = timeout;
        self
    }

    /// Set the resync retry budget
    #[must_use]
    pub fn resync_attempts(mut self, attempts: u32) -> Self {
        self.config.resync.max_attempts = attempts;
        self
    }

    /// Set the resync backoff base and jitter
    #[must_use]
    pub fn resync_backoff(mut self, base: Duration, jitter: Duration) -> Self {
        self.config.resync.backoff_base = base;
        self.config.resync.backoff_jitter = jitter;
        self
    }

    /// Replace the correction section wholesale
    #[must_use]
    pub fn correction(mut self, correction: CorrectionConfig) -> Self {
        self.config.correction = correction;
        self
    }

    /// Replace the scheduler section wholesale
    #[must_use]
    pub fn scheduler(mut self, scheduler: SchedulerConfig) -> Self {
        self.config.scheduler = scheduler;
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> SyncConfig {
        self.config
    }
}
