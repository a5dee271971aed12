//! Biometrics row detection built on per-icon template matching

pub mod config;
pub mod detector;
pub mod edges;

pub use config::{DebugConfig, EdgeFallbackConfig, RowDetectionConfig};
pub use detector::{RowDetector, find_icon};
