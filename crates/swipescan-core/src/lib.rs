//! Swipescan core
//!
//! Device-agnostic profile scanning: perceptual hashing, row consensus,
//! scroll actuation and the bounded scan loops built on top of them.
//! Nothing in this crate touches OpenCV; pixel matching lives in `swipescan-cv`.

pub mod config;
pub mod consensus;
pub mod device;
pub mod error;
pub mod hash;
pub mod manifest;
pub mod orchestrator;
pub mod pages;
pub mod replay;
pub mod scan;
pub mod scroll;
pub mod stitch;
pub mod sweep;
pub mod timing;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-export commonly used types
pub use config::ScanConfig;
pub use consensus::{
    ConsensusFailure, ConsensusMethod, MatchCandidate, RowConsensus, RowOutcome, TemplateDetection,
};
pub use device::{Device, Extractor, GestureSink, RowLocator, ScreenshotSource};
pub use error::ScanError;
pub use hash::PerceptualHash;
pub use manifest::ImageManifest;
pub use orchestrator::{ProfileScan, ProfileScanner};
pub use pages::{PageCollection, PageCollector};
pub use replay::ReplayDevice;
pub use scan::{ScanLoop, ScanOutcome, StopReason};
pub use scroll::ScrollController;
pub use stitch::{BiometricsStitcher, StitchResult};
pub use sweep::{CarouselSweep, SweepEnd, SweepOutcome};

// Error handling
pub type Result<T> = anyhow::Result<T>;
