//! Scan configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main scan configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub images_dir: PathBuf,
    pub scroll: ScrollConfig,
    pub sweep: SweepConfig,
    pub carousel: CarouselConfig,
    pub pages: PageConfig,
    pub manifest: ManifestConfig,
}

/// Gesture geometry and settle delays
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollConfig {
    /// Fraction of screen height covered by one page scroll.
    pub page_distance: f32,
    /// Slightly-less-than-a-page scroll issued before any detection.
    pub settle_distance: f32,
    pub vertical_duration_ms: u32,
    /// Horizontal wobble added to vertical swipes so they are never read as taps.
    pub x_jitter_px: i32,
    /// Swipe endpoints stay above this fraction of the screen height.
    pub bottom_guard: f32,
    pub top_guard: f32,
    pub horizontal_duration_ms: u32,
    /// Gesture-safe corridor for horizontal swipes, as fractions of width.
    pub horizontal_margin: f32,
    pub vertical_settle_ms: u64,
    pub horizontal_settle_ms: u64,
}

/// Carousel sweep: locate the biometrics row across vertical pages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub max_sweep_pages: usize,
    pub stable_repeats: usize,
    pub threshold: f64,
    /// One retry per page at this lower threshold.
    pub retry_threshold: Option<f64>,
    pub hash_size: u32,
    pub hamming_threshold: u32,
}

/// Horizontal biometrics stitcher
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CarouselConfig {
    pub max_horizontal_swipes: usize,
    pub stable_repeats: usize,
    pub micro_swipe_ratio: f32,
    pub seek_swipe_ratio: f32,
    pub target_center_x_ratio: f32,
    pub band_height_ratio: f32,
    pub min_band_px: u32,
    /// Explicit band height; overrides the ratio when set.
    pub band_px: Option<u32>,
    pub subtext_height_ratio: f32,
    pub hash_size: u32,
    /// Kept stricter than the vertical threshold: carousel frames differ far less.
    pub hamming_threshold: u32,
}

/// Vertical page collector
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PageConfig {
    pub max_vertical_pages: usize,
    pub stable_repeats: usize,
    pub hash_size: u32,
    pub hamming_threshold: u32,
}

/// Image manifest assembly
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestConfig {
    pub max_images: usize,
    pub include_top_screenshot: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            images_dir: "images".into(),
            scroll: ScrollConfig::default(),
            sweep: SweepConfig::default(),
            carousel: CarouselConfig::default(),
            pages: PageConfig::default(),
            manifest: ManifestConfig::default(),
        }
    }
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            page_distance: 0.60,
            settle_distance: 0.50,
            vertical_duration_ms: 450,
            x_jitter_px: 4,
            bottom_guard: 0.85,
            top_guard: 0.10,
            horizontal_duration_ms: 400,
            horizontal_margin: 0.10,
            vertical_settle_ms: 800,
            horizontal_settle_ms: 1600,
        }
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            max_sweep_pages: 4,
            stable_repeats: 2,
            threshold: 0.70,
            retry_threshold: Some(0.62),
            hash_size: 8,
            hamming_threshold: 5,
        }
    }
}

impl Default for CarouselConfig {
    fn default() -> Self {
        Self {
            max_horizontal_swipes: 12,
            stable_repeats: 2,
            micro_swipe_ratio: 0.25,
            seek_swipe_ratio: 0.60,
            target_center_x_ratio: 0.38,
            band_height_ratio: 0.10,
            min_band_px: 60,
            band_px: None,
            subtext_height_ratio: 0.14,
            hash_size: 8,
            hamming_threshold: 1,
        }
    }
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            max_vertical_pages: 6,
            stable_repeats: 2,
            hash_size: 8,
            hamming_threshold: 5,
        }
    }
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            max_images: 10,
            include_top_screenshot: true,
        }
    }
}

impl CarouselConfig {
    /// Height of each stitched band for a screen of `screen_height` pixels.
    pub fn band_height(&self, screen_height: u32) -> u32 {
        self.band_px.filter(|&px| px > 0).unwrap_or_else(|| {
            self.min_band_px
                .max((screen_height as f32 * self.band_height_ratio).round() as u32)
        })
    }

    /// Height of the caption strip appended under the stitched bands.
    /// Always strictly taller than one band.
    pub fn subtext_height(&self, screen_height: u32) -> u32 {
        ((screen_height as f32 * self.subtext_height_ratio).round() as u32)
            .max(self.band_height(screen_height) + 1)
    }
}

impl ScanConfig {
    /// Zero settle delays, for replayed frames and tests.
    pub fn without_delays() -> Self {
        let mut config = Self::default();
        config.scroll.vertical_settle_ms = 0;
        config.scroll.horizontal_settle_ms = 0;
        config
    }
}
