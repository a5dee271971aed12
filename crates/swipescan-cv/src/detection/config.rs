//! Row detection configuration

use crate::template::MatchParams;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Biometrics row detection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RowDetectionConfig {
    pub asset_dir: PathBuf,
    /// Icons expected on the row; two or three for consensus.
    pub templates: Vec<String>,
    pub match_params: MatchParams,
    pub tolerance_px: i32,
    pub tolerance_ratio: f64,
    /// With two templates, refuse to trust a lone detection.
    pub require_both: bool,
    pub edges_fallback: EdgeFallbackConfig,
    pub debug: DebugConfig,
}

/// Strongest vertical-edge row, used only when explicitly enabled
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeFallbackConfig {
    pub enabled: bool,
    pub roi_top: f64,
    pub roi_bottom: f64,
    /// Odd Gaussian kernel length for the row profile.
    pub smooth_kernel: usize,
}

/// Diagnostic overlays and candidate sidecars
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub save_debug: bool,
    pub debug_dir: PathBuf,
}

impl Default for RowDetectionConfig {
    fn default() -> Self {
        Self {
            asset_dir: "assets".into(),
            templates: vec!["age".to_string(), "gender".to_string(), "height".to_string()],
            match_params: MatchParams::default(),
            tolerance_px: 12,
            tolerance_ratio: 0.005,
            require_both: true,
            edges_fallback: EdgeFallbackConfig::default(),
            debug: DebugConfig::default(),
        }
    }
}

impl Default for EdgeFallbackConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            roi_top: 0.15,
            roi_bottom: 0.60,
            smooth_kernel: 21,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            save_debug: false,
            debug_dir: "images/debug".into(),
        }
    }
}
