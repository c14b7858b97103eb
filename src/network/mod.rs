//! Network quality monitoring

pub mod quality;


pub use quality::{NetworkQuality, NetworkQualityMonitor, QualityBand};
