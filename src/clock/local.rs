//! Local wall clock capability

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of local wall-clock time in milliseconds
///
/// Canonical timestamps are server milliseconds since the Unix epoch, so the
/// local clock reports the same unit. The smoothed offset translates one
/// into the other.
pub trait LocalClock: Send + Sync {
    /// Current local time in milliseconds since the Unix epoch
    fn now_ms(&self) -> f64;
}

/// Clock backed by the operating system's wall clock
///
/// Not monotonic. A wall-clock step appears as a drift jump until the next
/// offset observation retargets the estimator.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl LocalClock for SystemClock {
    fn now_ms(&self) -> f64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        now.as_secs_f64() * 1000.0
    }
}

/// Manually driven clock for tests and simulations
///
/// Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    /// Current time as `f64` bits
    now_bits: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a clock reading `start_ms`
    #[must_use]
    pub fn new(start_ms: f64) -> Self {
        Self {
            now_bits: Arc::new(AtomicU64::new(start_ms.to_bits())),
        }
    }

    /// Set the current time
    pub fn set(&self, now_ms: f64) {
        self.now_bits.store(now_ms.to_bits(), Ordering::Release);
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        self.advance_ms(by.as_secs_f64() * 1000.0);
    }

    /// Move the clock forward by a number of milliseconds
    pub fn advance_ms(&self, ms: f64) {
        let now = self.now_ms();
        self.set(now + ms);
    }
}

impl LocalClock for ManualClock {
    fn now_ms(&self) -> f64 {
        f64::from_bits(self.now_bits.load(Ordering::Acquire))
    }
}
