//! Round-trip probing of the canonical time source

use std::time::Duration;

use super::local::LocalClock;
use super::offset::{OffsetBatch, OffsetEstimator, TimeSample};
use crate::error::Result;
use crate::network::NetworkQualityMonitor;
use crate::runtime::Runtime;
use crate::session::TimeSource;
use crate::types::OffsetConfig;

/// Send one probe and time its round trip
///
/// # Errors
///
/// Returns `SyncError::Timeout` when no reply arrives within `timeout`, or
/// the time source's own error.
pub async fn probe_once(
    source: &dyn TimeSource,
    clock: &dyn LocalClock,
    timeout: Duration,
) -> Result<TimeSample> {
    let client_sent = clock.now_ms();
    let (server_time, server_received) =
        Runtime::timeout(timeout, source.time_sync(client_sent)).await??;
    Ok(TimeSample {
        client_sent,
        server_time,
        server_received,
        client_received: clock.now_ms(),
    })
}

/// Probe a batch and move the estimator toward its mean
///
/// Lost probes count against network quality when a monitor is supplied;
/// successful ones contribute their RTT.
///
/// # Errors
///
/// Returns `SyncError::InvalidSample` when too few probes produced valid
/// samples.
pub async fn refresh_offset(
    source: &dyn TimeSource,
    clock: &dyn LocalClock,
    estimator: &mut OffsetEstimator,
    config: &OffsetConfig,
    timeout: Duration,
    mut network: Option<&mut NetworkQualityMonitor>,
) -> Result<OffsetBatch> {
    let mut samples = Vec::with_capacity(config.batch_size);
    for i in 0..config.batch_size {
        if i > 0 && !config.batch_spacing.is_zero() {
            Runtime::sleep(config.batch_spacing).await;
        }
        match probe_once(source, clock, timeout).await {
            Ok(sample) => {
                if let Some(monitor) = network.as_deref_mut() {
                    // Invalid RTTs are rejected again by the estimator below
                    let _ = monitor.record_rtt(sample.rtt_ms());
                }
                samples.push(sample);
            }
            Err(e) => {
                tracing::debug!(probe = i, error = %e, "Offset: probe lost");
                if let Some(monitor) = network.as_deref_mut() {
                    monitor.record_loss();
                }
            }
        }
    }
    estimator.observe_batch(&samples)
}
