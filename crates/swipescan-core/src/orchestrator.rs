//! Profile scan orchestrator
//!
//! Per profile, strictly in order: top screenshot, settle scroll, carousel
//! sweep, biometrics stitch, page collection, manifest, extraction. Each step
//! consumes the previous step's output.

use crate::config::ScanConfig;
use crate::consensus::ConsensusMethod;
use crate::device::{Device, Extractor, RowLocator};
use crate::error::ScanError;
use crate::manifest::ImageManifest;
use crate::pages::PageCollector;
use crate::scroll::{ScrollController, VerticalDirection};
use crate::stitch::BiometricsStitcher;
use crate::sweep::{CarouselSweep, SweepOutcome};
use crate::timing::StageTimings;
use log::info;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;

/// Everything one profile scan produced.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileScan {
    pub top_screenshot: PathBuf,
    pub row_y: i32,
    pub row_method: ConsensusMethod,
    /// Pages examined by the sweep; zero when the row was given.
    pub pages_scanned: usize,
    pub carousel: Option<PathBuf>,
    pub carousel_frames: usize,
    pub pages: Vec<PathBuf>,
    pub manifest: ImageManifest,
    pub timings: StageTimings,
}

pub struct ProfileScanner<'a, L: RowLocator + ?Sized> {
    config: &'a ScanConfig,
    locator: &'a L,
    row_override: Option<i32>,
}

impl<'a, L: RowLocator + ?Sized> ProfileScanner<'a, L> {
    pub fn new(config: &'a ScanConfig, locator: &'a L) -> Self {
        Self {
            config,
            locator,
            row_override: None,
        }
    }

    /// Skip the sweep and stitch at a known row.
    pub fn with_row_override(mut self, y: Option<i32>) -> Self {
        self.row_override = y;
        self
    }

    /// Scan the profile currently on screen. `top` reuses an existing
    /// top-of-profile screenshot instead of capturing one.
    pub fn scan<D: Device + ?Sized>(
        &self,
        device: &mut D,
        top: Option<PathBuf>,
    ) -> Result<ProfileScan, ScanError> {
        let started = Instant::now();
        let mut timings = StageTimings::default();

        let top = match top {
            Some(path) => path,
            None => device.capture_screenshot("top")?,
        };
        let scroller = ScrollController::new(self.config.scroll.clone(), device.screen_resolution()?);
        scroller.scroll_vertical(device, VerticalDirection::Down, self.config.scroll.settle_distance)?;

        let (row_y, row_method, pages_scanned, row_frame) = match self.row_override {
            Some(y) => {
                info!("Using row override y={}", y);
                (y, ConsensusMethod::Override, 0, None)
            }
            None => {
                let report = CarouselSweep::new(&self.config.sweep, &self.config.scroll)
                    .run(device, self.locator, &scroller, None)?;
                timings.merge(&report.timings);
                match report.outcome {
                    SweepOutcome::Found {
                        y,
                        pages_scanned,
                        image_used,
                        method,
                    } => (y, method, pages_scanned, Some(image_used)),
                    SweepOutcome::NotFound { pages_scanned, end } => {
                        return Err(ScanError::RowNotFound { pages_scanned, end });
                    }
                }
            }
        };

        let stitch = BiometricsStitcher::new(&self.config.carousel).run(
            device,
            &scroller,
            row_y,
            row_frame,
            &self.config.images_dir,
        )?;
        timings.merge(&stitch.timings);

        // Paging continues from the row page. Sweep frames above the row are not
        // kept; the top screenshot stands in for that part of the profile.
        let collection = PageCollector::new(&self.config.pages, &self.config.scroll)
            .run(device, &scroller, None)?;
        timings.merge(&collection.timings);

        let manifest = ImageManifest::assemble(
            self.config
                .manifest
                .include_top_screenshot
                .then_some(top.as_path()),
            stitch.path.as_deref(),
            &collection.pages,
            self.config.manifest.max_images,
        )?;

        timings.total_ms = started.elapsed().as_millis() as u64;
        info!(
            "Profile scanned: row y={} ({:?}), {} carousel frame(s), {} page(s), {} image(s) in manifest, {} ms",
            row_y,
            row_method,
            stitch.frames.len(),
            collection.pages.len(),
            manifest.len(),
            timings.total_ms
        );

        Ok(ProfileScan {
            top_screenshot: top,
            row_y,
            row_method,
            pages_scanned,
            carousel: stitch.path,
            carousel_frames: stitch.frames.len(),
            pages: collection.pages,
            manifest,
            timings,
        })
    }

    /// [`scan`](Self::scan), then hand the manifest to `extractor`.
    pub fn scan_and_submit<D, E>(
        &self,
        device: &mut D,
        extractor: &mut E,
        prompt: &str,
    ) -> Result<(ProfileScan, serde_json::Value), ScanError>
    where
        D: Device + ?Sized,
        E: Extractor + ?Sized,
    {
        let scan = self.scan(device, None)?;
        let extracted = extractor.submit(scan.manifest.images(), prompt)?;
        Ok((scan, extracted))
    }
}
