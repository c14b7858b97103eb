//! Operator- or event-triggered resynchronization

pub mod coordinator;
pub mod ledger;
pub mod retry;


pub use coordinator::{ResyncContext, ResyncCoordinator, ResyncOutcome};
pub use ledger::{AttemptResult, ResyncAttempt, ResyncLedger, ResyncStats};
pub use retry::{AttemptInfo, RetryPolicy};
