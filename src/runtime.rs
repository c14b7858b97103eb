//! Runtime helpers
//!
//! Thin wrappers over tokio so that timeouts surface as [`SyncError`].

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::error::{Result, SyncError};

/// Runtime abstraction for common operations
pub struct Runtime;

impl Runtime {
    /// Sleep for the specified duration
    pub async fn sleep(duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    /// Run a future with a timeout
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Timeout` if the future does not complete within
    /// the specified duration.
    pub async fn timeout<F, T>(duration: Duration, future: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        tokio::time::timeout(duration, future)
            .await
            .map_err(|_| SyncError::Timeout { duration })
    }

    /// Spawn a detached task
    pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        tokio::spawn(future)
    }
}
