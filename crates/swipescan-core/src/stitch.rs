//! Horizontal biometrics stitcher
//!
//! Swipes the biometrics carousel along a known row, keeps every frame whose
//! band around the row changed, and stacks those bands into one image with a
//! caption strip from the first frame underneath.

use crate::Result;
use crate::config::CarouselConfig;
use crate::device::Device;
use crate::hash::BandSpec;
use crate::scan::{Flow, ScanLimits, ScanLoop, SimilarityRule, StopReason, StridePolicy};
use crate::scroll::{HorizontalDirection, ScrollController};
use crate::timing::StageTimings;
use anyhow::Context;
use image::{RgbImage, imageops};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone)]
pub struct StitchResult {
    /// `None` when no kept frame could be decoded.
    pub path: Option<PathBuf>,
    pub frames: Vec<PathBuf>,
    pub band_px: u32,
    pub subtext_px: u32,
    pub stop: StopReason,
    pub timings: StageTimings,
}

/// Top row of a `band_px` band centred on `y`, shifted to stay inside the frame.
pub fn band_top(y: i32, band_px: u32, frame_height: u32) -> u32 {
    let max_top = frame_height.saturating_sub(band_px) as i64;
    (y as i64 - band_px as i64 / 2).clamp(0, max_top) as u32
}

/// Stack a `band_px` band around `y` from every frame, in order, and append a
/// `subtext_px` strip taken from the first frame just below its band.
///
/// The result is exactly `frames.len() * band_px + subtext_px` rows high and
/// as wide as the first frame.
pub fn compose_bands(frames: &[RgbImage], y: i32, band_px: u32, subtext_px: u32) -> Option<RgbImage> {
    let first = frames.first()?;
    let width = first.width();
    let height = frames.len() as u32 * band_px + subtext_px;
    let mut out = RgbImage::new(width, height);

    for (i, frame) in frames.iter().enumerate() {
        let top = band_top(y, band_px, frame.height());
        let band = imageops::crop_imm(frame, 0, top, width.min(frame.width()), band_px).to_image();
        imageops::replace(&mut out, &band, 0, i as i64 * band_px as i64);
    }

    let band_end = band_top(y, band_px, first.height()) + band_px;
    let sub_top = band_end.min(first.height().saturating_sub(subtext_px));
    let strip = imageops::crop_imm(first, 0, sub_top, width, subtext_px).to_image();
    imageops::replace(&mut out, &strip, 0, frames.len() as i64 * band_px as i64);

    Some(out)
}

fn unique_output_path(dir: &Path) -> PathBuf {
    let mut millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    loop {
        let path = dir.join(format!("carousel_{millis}.png"));
        if !path.exists() {
            return path;
        }
        millis += 1;
    }
}

pub struct BiometricsStitcher<'a> {
    config: &'a CarouselConfig,
}

impl<'a> BiometricsStitcher<'a> {
    pub fn new(config: &'a CarouselConfig) -> Self {
        Self { config }
    }

    /// Sweep the carousel on row `y` and write the stitched image into `output_dir`.
    pub fn run<D: Device + ?Sized>(
        &self,
        device: &mut D,
        scroller: &ScrollController,
        y: i32,
        start: Option<PathBuf>,
        output_dir: &Path,
    ) -> Result<StitchResult> {
        let (width, height) = scroller.screen();
        let band_px = self.config.band_height(height);
        let subtext_px = self.config.subtext_height(height);
        let centre_x = (width as f32 * self.config.target_center_x_ratio).round() as i32;

        let scan = ScanLoop::new(
            "carousel",
            SimilarityRule::Band {
                y_center: y as i64,
                band: BandSpec::Pixels(band_px),
                hash_size: self.config.hash_size,
                threshold: self.config.hamming_threshold,
            },
            StridePolicy::Adaptive {
                micro: self.config.micro_swipe_ratio,
                seek: self.config.seek_swipe_ratio,
            },
            ScanLimits {
                max_steps: self.config.max_horizontal_swipes,
                stable_repeats: self.config.stable_repeats,
            },
        );
        let outcome = scan.run(
            device,
            start,
            |d: &mut D, stride| {
                scroller
                    .scroll_horizontal(d, HorizontalDirection::Forward, stride, y, centre_x)
                    .map(|_| ())
            },
            |_| Ok(Flow::Continue),
        )?;

        let images: Vec<RgbImage> = outcome
            .kept_frames
            .iter()
            .filter_map(|path| match image::open(path) {
                Ok(image) => Some(image.to_rgb8()),
                Err(e) => {
                    warn!("Skipping unreadable carousel frame {:?}: {}", path, e);
                    None
                }
            })
            .collect();

        let path = match compose_bands(&images, y, band_px, subtext_px) {
            Some(stitched) => {
                std::fs::create_dir_all(output_dir)
                    .with_context(|| format!("Failed to create {:?}", output_dir))?;
                let path = unique_output_path(output_dir);
                stitched
                    .save(&path)
                    .with_context(|| format!("Failed to write stitched carousel {:?}", path))?;
                info!(
                    "Stitched {} carousel frame(s) into {:?} ({}x{})",
                    images.len(),
                    path,
                    stitched.width(),
                    stitched.height()
                );
                Some(path)
            }
            None => {
                warn!("No readable carousel frames; nothing stitched");
                None
            }
        };

        Ok(StitchResult {
            path,
            frames: outcome.kept_frames,
            band_px,
            subtext_px,
            stop: outcome.stop,
            timings: outcome.timings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanConfig;
    use crate::replay::ReplayDevice;
    use crate::test_utils::stripe_image;
    use image::{DynamicImage, Rgb};

    #[test]
    fn test_stitched_dimensions() {
        let frames: Vec<RgbImage> = (0..3)
            .map(|i| RgbImage::from_pixel(120, 400, Rgb([i * 40, 0, 0])))
            .collect();
        let out = compose_bands(&frames, 200, 40, 56).unwrap();
        assert_eq!(out.width(), 120);
        assert_eq!(out.height(), 3 * 40 + 56);
        assert_eq!(out.get_pixel(0, 45), &Rgb([40, 0, 0]));
        assert_eq!(out.get_pixel(0, 130), &Rgb([0, 0, 0]));
        assert!(compose_bands(&[], 200, 40, 56).is_none());
    }

    #[test]
    fn test_band_near_edges_is_shifted_inside() {
        assert_eq!(band_top(5, 40, 400), 0);
        assert_eq!(band_top(395, 40, 400), 360);
        assert_eq!(band_top(200, 40, 400), 180);

        let frame = RgbImage::from_fn(10, 100, |_, y| Rgb([y as u8, 0, 0]));
        let out = compose_bands(&[frame], 98, 20, 30).unwrap();
        assert_eq!(out.height(), 50);
        assert_eq!(out.get_pixel(0, 0), &Rgb([80, 0, 0]));
        // Subtext strip clamped to the last 30 rows.
        assert_eq!(out.get_pixel(0, 20), &Rgb([70, 0, 0]));
    }

    #[test]
    fn test_band_changes_drive_the_carousel() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let frames_dir = dir.path().join("frames");
        std::fs::create_dir_all(&frames_dir)?;

        // Background constant, band around y=100 changes twice then settles.
        let mut frames = Vec::new();
        for (i, kind) in [0u32, 1, 2, 2, 2].into_iter().enumerate() {
            let band = stripe_image(kind, 200, 60);
            let mut frame = stripe_image(3, 200, 400);
            imageops::replace(&mut frame, &band, 0, 70);
            let path = frames_dir.join(format!("c_{i}.png"));
            DynamicImage::ImageLuma8(frame).save(&path)?;
            frames.push(path);
        }

        let mut config = ScanConfig::without_delays();
        config.carousel.band_px = Some(60);
        let scroller = ScrollController::new(config.scroll.clone(), (200, 400));
        let mut device = ReplayDevice::new(frames.clone(), (200, 400))?;

        let out_dir = dir.path().join("out");
        let result = BiometricsStitcher::new(&config.carousel).run(&mut device, &scroller, 100, None, &out_dir)?;

        assert_eq!(result.frames, frames[..3].to_vec());
        assert_eq!(result.stop, StopReason::Stable);
        assert_eq!(device.swipes().len(), 4);
        assert!(device.swipes().iter().all(|s| s.y1 == 100 && s.x1 > s.x2));

        let path = result.path.expect("stitched image written");
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("carousel_") && name.ends_with(".png"));
        let (w, h) = image::image_dimensions(&path)?;
        assert_eq!((w, h), (200, 3 * 60 + result.subtext_px));
        assert_eq!(result.subtext_px, 61);
        Ok(())
    }
}
