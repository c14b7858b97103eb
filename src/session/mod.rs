//! Session ownership and collaborator interfaces

#[allow(clippy::module_inception)]
pub mod session;
pub mod status;
pub mod transport;


pub use session::{SyncSession, SyncSessionBuilder, TickOutcome};
pub use status::{SyncSnapshot, SyncStatus};
pub use transport::{DriftReport, MediaElement, SessionTransport, TimeSource};
