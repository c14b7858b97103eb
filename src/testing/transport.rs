//! Scripted session transport and time source

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use super::network_sim::NetworkSimulator;
use crate::error::{Result, SyncError};
use crate::session::{DriftReport, SessionTransport, TimeSource};

/// One scripted answer to `sync_request`
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    /// Answer with this payload
    State(Value),
    /// Answer without a state
    Empty,
    /// Fail with a transport error
    Fail,
    /// Never answer
    Hang,
}

#[derive(Debug, Default)]
struct TransportState {
    replies: VecDeque<MockReply>,
    fallback: Option<Value>,
    sync_requests: u32,
    time_syncs: u32,
    reports: Vec<DriftReport>,
    fail_reports: bool,
}

/// Transport double answering from a script
///
/// Replies are consumed in order; once the script runs out, the fallback
/// state (if any) is returned. The simulator adds delay and loss to every
/// request, and a lost request never completes.
#[derive(Debug, Default)]
pub struct MockTransport {
    state: Mutex<TransportState>,
    simulator: NetworkSimulator,
    server_offset_ms: f64,
}

impl MockTransport {
    /// Create a transport with a perfect network and no script
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply simulated network conditions
    #[must_use]
    pub fn with_simulator(mut self, simulator: NetworkSimulator) -> Self {
        self.simulator = simulator;
        self
    }

    /// Make the server clock run `offset_ms` ahead of the client's
    #[must_use]
    pub fn with_server_offset(mut self, offset_ms: f64) -> Self {
        self.server_offset_ms = offset_ms;
        self
    }

    fn state(&self) -> MutexGuard<'_, TransportState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a reply
    pub fn push_reply(&self, reply: MockReply) {
        self.state().replies.push_back(reply);
    }

    /// Queue the same reply `count` times
    pub fn push_replies(&self, reply: &MockReply, count: usize) {
        let mut state = self.state();
        for _ in 0..count {
            state.replies.push_back(reply.clone());
        }
    }

    /// Payload returned once the script is exhausted
    pub fn set_fallback_state(&self, payload: Option<Value>) {
        self.state().fallback = payload;
    }

    /// Make `drift_report` fail
    pub fn set_fail_reports(&self, fail: bool) {
        self.state().fail_reports = fail;
    }

    /// `sync_request` calls received
    #[must_use]
    pub fn sync_requests(&self) -> u32 {
        self.state().sync_requests
    }

    /// `time_sync` calls received
    #[must_use]
    pub fn time_syncs(&self) -> u32 {
        self.state().time_syncs
    }

    /// Drift reports delivered
    #[must_use]
    pub fn reports(&self) -> Vec<DriftReport> {
        self.state().reports.clone()
    }

    async fn traverse(&self) {
        if self.simulator.should_drop() {
            std::future::pending::<()>().await;
        }
        let delay = self.simulator.round_trip_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl SessionTransport for MockTransport {
    async fn sync_request(&self, session_id: &str) -> Result<Option<Value>> {
        let reply = {
            let mut state = self.state();
            state.sync_requests += 1;
            state
                .replies
                .pop_front()
                .unwrap_or_else(|| state.fallback.clone().map_or(MockReply::Empty, MockReply::State))
        };
        tracing::trace!(session_id, ?reply, "Mock transport: sync_request");

        self.traverse().await;
        match reply {
            MockReply::State(payload) => Ok(Some(payload)),
            MockReply::Empty => Ok(None),
            MockReply::Fail => Err(SyncError::TransportFailure {
                message: "scripted failure".to_string(),
                source: None,
            }),
            MockReply::Hang => std::future::pending().await,
        }
    }

    async fn drift_report(&self, report: DriftReport) -> Result<()> {
        let mut state = self.state();
        if state.fail_reports {
            return Err(SyncError::TransportFailure {
                message: "report rejected".to_string(),
                source: None,
            });
        }
        state.reports.push(report);
        Ok(())
    }
}

#[async_trait]
impl TimeSource for MockTransport {
    async fn time_sync(&self, client_sent: f64) -> Result<(f64, f64)> {
        self.state().time_syncs += 1;
        self.traverse().await;
        let server_time = client_sent + self.server_offset_ms;
        Ok((server_time, server_time))
    }
}
