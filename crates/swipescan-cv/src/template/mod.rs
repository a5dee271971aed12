//! Template matching module

pub mod loader;
pub mod matcher;

pub use loader::TemplateLoader;
pub use matcher::{MatchReport, TemplateMatcher};

use opencv::core::Mat;
use opencv::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Grayscale icon with an optional correlation mask
#[derive(Debug, Clone)]
pub struct Template {
    pub name: String,
    pub image: Mat,
    /// Alpha channel of the source asset, when it had one.
    pub mask: Option<Mat>,
    pub path: PathBuf,
}

impl Template {
    pub fn new(name: &str, image: Mat) -> Self {
        Self {
            name: name.to_string(),
            image,
            mask: None,
            path: PathBuf::new(),
        }
    }

    pub fn with_mask(mut self, mask: Option<Mat>) -> Self {
        self.mask = mask;
        self
    }

    pub fn with_path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    pub fn width(&self) -> i32 {
        self.image.cols()
    }

    pub fn height(&self) -> i32 {
        self.image.rows()
    }
}

/// Which representation the screenshot and template are compared in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchDomain {
    /// Masked normalized cross-correlation on intensities
    Grayscale,
    /// Correlation coefficient on Canny edge maps (theme independent)
    Edges,
}

/// Template matching parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchParams {
    /// Vertical search band as fractions of the screenshot height.
    pub roi_top: f64,
    pub roi_bottom: f64,
    pub threshold: f64,
    pub use_edges: bool,
    /// Explicit scale list; derived from `expected_px` when absent.
    pub scales: Option<Vec<f64>>,
    pub expected_px: f64,
    pub scale_tolerance: f64,
    pub scale_steps: usize,
    pub min_px: i32,
    pub max_roi_frac: f64,
    pub edges_dilate_iter: i32,
    pub top_k: usize,
    pub nms_threshold: f64,
}

impl Default for MatchParams {
    fn default() -> Self {
        Self {
            roi_top: 0.0,
            roi_bottom: 0.55,
            threshold: 0.70,
            use_edges: true,
            scales: None,
            expected_px: 60.0,
            scale_tolerance: 0.30,
            scale_steps: 15,
            min_px: 20,
            max_roi_frac: 0.12,
            edges_dilate_iter: 1,
            top_k: 3,
            nms_threshold: 0.3,
        }
    }
}

impl MatchParams {
    pub fn domain(&self) -> MatchDomain {
        if self.use_edges {
            MatchDomain::Edges
        } else {
            MatchDomain::Grayscale
        }
    }

    /// Whole-screen search for buttons and fields at native scale
    pub fn button_search() -> Self {
        Self {
            roi_top: 0.0,
            roi_bottom: 1.0,
            threshold: 0.80,
            use_edges: false,
            scales: Some(vec![0.8, 0.9, 1.0, 1.1, 1.2]),
            ..Default::default()
        }
    }

    /// Intensity matching, for assets with a usable alpha channel
    pub fn grayscale() -> Self {
        Self {
            use_edges: false,
            ..Default::default()
        }
    }

    pub fn with_roi(mut self, top: f64, bottom: f64) -> Self {
        self.roi_top = top;
        self.roi_bottom = bottom;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }
}
