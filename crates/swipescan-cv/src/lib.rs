//! Swipescan Computer Vision Library
//!
//! Multi-scale icon matching on profile screenshots and the row detector
//! that feeds the scan engine.

pub mod candidates;
pub mod detection;
pub mod template;
pub mod utils;

// Re-export commonly used types
pub use candidates::{CandidateSet, CandidateStats, MatchBox};
pub use detection::{DebugConfig, EdgeFallbackConfig, RowDetectionConfig, RowDetector, find_icon};
pub use template::{MatchDomain, MatchParams, MatchReport, Template, TemplateLoader, TemplateMatcher};
pub use utils::ImageUtils;

// Re-export opencv-match for convenience
pub use opencv_match::prelude::*;

// Error handling
pub type Result<T> = anyhow::Result<T>;
