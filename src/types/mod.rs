//! Core types module

mod config;
mod state;


pub use config::{
    CorrectionConfig, CorrectionProfile, DriftConfig, NetworkConfig, OffsetConfig, ResyncConfig,
    SchedulerConfig, SyncConfig, SyncConfigBuilder,
};
pub use state::CanonicalState;
