//! Test doubles for the session collaborators
//!
//! Exported so that downstream crates can drive a [`crate::SyncSession`]
//! without a real transport or audio device.

pub mod media;
pub mod network_sim;
pub mod transport;


pub use media::MockMediaElement;
pub use network_sim::NetworkSimulator;
pub use transport::{MockReply, MockTransport};
