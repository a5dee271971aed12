//! Multi-profile run: scan, submit, skip to the next profile

use crate::config::AppConfig;
use anyhow::{Context, Result};
use log::{info, warn};
use serde::Serialize;
use swipescan_core::{Device, Extractor, ProfileScanner, RowLocator};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub scanned: usize,
    pub skipped: usize,
    pub submitted: usize,
}

pub struct Session<'a, L: RowLocator + ?Sized> {
    config: &'a AppConfig,
    locator: &'a L,
}

impl<'a, L: RowLocator + ?Sized> Session<'a, L> {
    pub fn new(config: &'a AppConfig, locator: &'a L) -> Self {
        Self { config, locator }
    }

    /// Process up to `session.max_profiles` profiles. A missing row skips the
    /// profile; a manifest over the cap or a device fault ends the run.
    pub fn run<D, E>(&self, device: &mut D, extractor: &mut E) -> Result<SessionSummary>
    where
        D: Device + ?Sized,
        E: Extractor + ?Sized,
    {
        let scanner = ProfileScanner::new(&self.config.scan, self.locator);
        let mut summary = SessionSummary::default();

        for profile in 1..=self.config.session.max_profiles {
            info!("Profile {}/{}", profile, self.config.session.max_profiles);
            summary.scanned += 1;

            match scanner.scan(device, None) {
                Ok(scan) => {
                    extractor
                        .submit(scan.manifest.images(), &self.config.session.prompt)
                        .with_context(|| format!("Extraction failed for profile {}", profile))?;
                    summary.submitted += 1;
                }
                Err(e) if !e.aborts_run() => {
                    warn!("Skipping profile {}: {}", profile, e);
                    summary.skipped += 1;
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("Run aborted at profile {}", profile));
                }
            }

            self.next_profile(device)?;
        }

        info!(
            "Session finished: {} scanned, {} skipped, {} submitted",
            summary.scanned, summary.skipped, summary.submitted
        );
        Ok(summary)
    }

    fn next_profile<D: Device + ?Sized>(&self, device: &mut D) -> Result<()> {
        let (width, height) = device.screen_resolution()?;
        let (fx, fy) = self.config.session.dislike_tap;
        let x = (width as f32 * fx).round() as i32;
        let y = (height as f32 * fy).round() as i32;
        device.tap(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::ManifestExporter;
    use image::{GrayImage, Luma};
    use std::path::{Path, PathBuf};
    use swipescan_core::{
        ConsensusFailure, ConsensusMethod, ReplayDevice, RowConsensus, RowOutcome, ScanConfig, ScanError,
    };

    struct FixedRow(Option<i32>);

    impl RowLocator for FixedRow {
        fn locate_row(&self, _screenshot: &Path, _threshold: f64) -> RowConsensus {
            match self.0 {
                Some(y) => RowConsensus {
                    outcome: RowOutcome::Found {
                        y,
                        method: ConsensusMethod::TwoOfThree,
                        delta_y: Some(0),
                    },
                    detections: Vec::new(),
                    tolerance_px: 12,
                },
                None => RowConsensus::not_found(ConsensusFailure::NoDetections, Vec::new(), 12),
            }
        }
    }

    fn setup(dir: &Path) -> Result<(AppConfig, ReplayDevice)> {
        let frame = dir.join("frame.png");
        GrayImage::from_fn(200, 400, |x, y| Luma([((x / 25 + y / 50) % 2 * 200 + 20) as u8])).save(&frame)?;

        let mut config = AppConfig::default();
        config.scan = ScanConfig::without_delays();
        config.scan.images_dir = dir.join("images");
        config.session.max_profiles = 2;
        let device = ReplayDevice::new(vec![frame], (200, 400))?;
        Ok((config, device))
    }

    fn export_dir(dir: &Path) -> PathBuf {
        dir.join("submitted")
    }

    #[test]
    fn test_every_profile_submitted_then_skipped() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (config, mut device) = setup(dir.path())?;
        let mut exporter = ManifestExporter::new(export_dir(dir.path()));

        let summary = Session::new(&config, &FixedRow(Some(120))).run(&mut device, &mut exporter)?;
        assert_eq!(
            summary,
            SessionSummary {
                scanned: 2,
                skipped: 0,
                submitted: 2
            }
        );
        assert_eq!(device.taps(), &[(30, 340), (30, 340)]);
        assert!(export_dir(dir.path()).join("profile_002/manifest.json").is_file());
        Ok(())
    }

    #[test]
    fn test_missing_row_skips_profile() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (config, mut device) = setup(dir.path())?;
        let mut exporter = ManifestExporter::new(export_dir(dir.path()));

        let summary = Session::new(&config, &FixedRow(None)).run(&mut device, &mut exporter)?;
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.submitted, 0);
        assert_eq!(device.taps().len(), 2);
        assert!(!export_dir(dir.path()).exists());
        Ok(())
    }

    #[test]
    fn test_manifest_cap_aborts_run() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (mut config, mut device) = setup(dir.path())?;
        config.scan.manifest.max_images = 2;
        let mut exporter = ManifestExporter::new(export_dir(dir.path()));

        let err = Session::new(&config, &FixedRow(Some(120)))
            .run(&mut device, &mut exporter)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ScanError>(),
            Some(ScanError::ManifestCapExceeded { actual: 3, cap: 2 })
        ));
        assert_eq!(exporter.submitted(), 0);
        assert!(device.taps().is_empty());
        Ok(())
    }
}
