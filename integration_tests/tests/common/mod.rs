//! Common test utilities and fixtures
#![allow(dead_code)]

use std::sync::{Arc, Once};
use std::time::Duration;

use playsync::testing::{MockMediaElement, MockTransport};
use playsync::{LocalClock, ManualClock, MediaElement, SyncConfig, SyncSession};
use serde_json::{json, Value};
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Server time the canonical position was recorded at
pub const START_MS: f64 = 1_000_000.0;

/// Canonical position at `START_MS`
pub const START_POSITION: f64 = 10.0;

/// Initialize test logging (call once per test module)
pub fn init_logging() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::from_default_env().add_directive("playsync=debug".parse().unwrap());

        fmt().with_env_filter(filter).with_test_writer().init();
    });
}

/// Configuration with delay compensation off so positions are exact
pub fn test_config() -> SyncConfig {
    SyncConfig::builder()
        .compensate_one_way_delay(false)
        .probe_timeout(Duration::from_secs(2))
        .build()
}

/// The session's canonical state payload
pub fn canonical_state() -> Value {
    json!({
        "isPlaying": true,
        "timestamp": START_POSITION,
        "lastUpdated": START_MS,
        "trackId": "track-1",
    })
}

/// One simulated listener
pub struct SimClient {
    pub name: &'static str,
    pub clock: Arc<ManualClock>,
    pub media: Arc<MockMediaElement>,
    pub transport: Arc<MockTransport>,
    pub session: SyncSession,
}

impl SimClient {
    /// Create a client starting `initial_drift` seconds off the session
    pub fn new(
        name: &'static str,
        transport: MockTransport,
        initial_drift: f64,
        with_time_source: bool,
    ) -> Self {
        let transport = Arc::new(transport);
        transport.set_fallback_state(Some(canonical_state()));
        let media = Arc::new(MockMediaElement::new(START_POSITION + initial_drift, true));
        media.set_output_latency(Some(Duration::ZERO));
        let clock = Arc::new(ManualClock::new(START_MS));

        let mut builder = SyncSession::builder("shared-session", transport.clone(), media.clone())
            .client_id(name)
            .clock(clock.clone())
            .config(test_config());
        if with_time_source {
            builder = builder.time_source(transport.clone());
        }

        Self {
            name,
            clock,
            media,
            transport,
            session: builder.build().expect("valid config"),
        }
    }

    /// Advance local time and playback together
    pub fn step(&self, by: Duration) {
        self.clock.advance(by);
        self.media.advance(by);
    }

    /// Current drift against the canonical position
    pub fn drift(&self) -> f64 {
        let expected = START_POSITION + (self.clock.now_ms() - START_MS) / 1000.0;
        self.media.position() - expected
    }
}

/// Let `total` of playback pass for every client in small steps
pub async fn play_all(clients: &[SimClient], total: Duration) {
    let step = Duration::from_millis(50);
    let steps = total.as_millis() / step.as_millis();
    for _ in 0..steps {
        for client in clients {
            client.step(step);
        }
        tokio::time::sleep(step).await;
    }
}
