//! Network condition simulation for testing
//!
//! Draws per-request loss and delay from a seedable generator so that
//! simulated sessions can be replayed exactly.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Network condition simulator
#[derive(Debug)]
pub struct NetworkSimulator {
    /// Request loss probability (0.0 to 1.0)
    pub loss_rate: f64,
    /// Jitter range (max delay added each way)
    pub jitter_ms: u32,
    /// Base one-way delay
    pub delay_ms: u32,
    rng: Mutex<StdRng>,
}

impl NetworkSimulator {
    fn with_conditions(loss_rate: f64, jitter_ms: u32, delay_ms: u32) -> Self {
        Self {
            loss_rate,
            jitter_ms,
            delay_ms,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Perfect network (no delay, no loss)
    #[must_use]
    pub fn perfect() -> Self {
        Self::with_conditions(0.0, 0, 0)
    }

    /// Good `WiFi` conditions
    #[must_use]
    pub fn good_wifi() -> Self {
        Self::with_conditions(0.001, 5, 2)
    }

    /// Moderate `WiFi` conditions
    #[must_use]
    pub fn moderate_wifi() -> Self {
        Self::with_conditions(0.01, 20, 10)
    }

    /// Poor `WiFi` conditions
    #[must_use]
    pub fn poor_wifi() -> Self {
        Self::with_conditions(0.05, 50, 30)
    }

    /// Very poor conditions (stress test)
    #[must_use]
    pub fn stress_test() -> Self {
        Self::with_conditions(0.10, 100, 50)
    }

    /// Make every draw reproducible
    #[must_use]
    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    /// Should this request be lost?
    #[must_use]
    pub fn should_drop(&self) -> bool {
        if self.loss_rate <= 0.0 {
            return false;
        }
        let p = self.loss_rate.min(1.0);
        self.rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .gen_bool(p)
    }

    /// One-way delay for this request
    #[must_use]
    pub fn one_way_delay(&self) -> Duration {
        let jitter: u32 = if self.jitter_ms > 0 {
            self.rng
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .gen_range(0..self.jitter_ms)
        } else {
            0
        };
        Duration::from_millis(u64::from(self.delay_ms + jitter))
    }

    /// Request plus reply delay
    #[must_use]
    pub fn round_trip_delay(&self) -> Duration {
        self.one_way_delay() + self.one_way_delay()
    }
}

impl Default for NetworkSimulator {
    fn default() -> Self {
        Self::perfect()
    }
}
