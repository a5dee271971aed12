// tests/scan_tests.rs
use image::{GrayImage, Luma};
use std::path::{Path, PathBuf};
use swipescan_core::{
    ConsensusFailure, ConsensusMethod, ProfileScanner, ReplayDevice, RowConsensus, RowLocator, RowOutcome,
    ScanConfig, ScanError,
};

type Result<T> = anyhow::Result<T>;

/// 8x8-cell pattern; kinds 4..7 are the inverses of 0..3.
fn pattern(kind: usize) -> GrayImage {
    GrayImage::from_fn(64, 64, |x, y| {
        let (cx, cy) = (x / 8, y / 8);
        let on = match kind % 4 {
            0 => cx % 2 == 0,
            1 => cy % 2 == 0,
            2 => (cx + cy) % 2 == 0,
            _ => (cx / 2 + cy / 2) % 2 == 0,
        };
        if on != (kind >= 4) { Luma([230]) } else { Luma([20]) }
    })
}

fn replay_dir(dir: &Path, kinds: &[usize]) -> Result<PathBuf> {
    let replay = dir.join("replay");
    std::fs::create_dir_all(&replay)?;
    for (i, &kind) in kinds.iter().enumerate() {
        pattern(kind).save(replay.join(format!("frame_{:02}.png", i)))?;
    }
    Ok(replay)
}

/// Finds the row only on the named frame, or on every frame.
struct RowAt {
    frame: Option<&'static str>,
    y: i32,
}

impl RowLocator for RowAt {
    fn locate_row(&self, screenshot: &Path, _threshold: f64) -> RowConsensus {
        let hit = match self.frame {
            Some(name) => screenshot.file_name().is_some_and(|f| f == name),
            None => true,
        };
        if hit {
            RowConsensus {
                outcome: RowOutcome::Found {
                    y: self.y,
                    method: ConsensusMethod::DualTemplates,
                    delta_y: Some(2),
                },
                detections: Vec::new(),
                tolerance_px: 12,
            }
        } else {
            RowConsensus::not_found(ConsensusFailure::NoAgreement, Vec::new(), 12)
        }
    }
}

fn config(dir: &Path) -> ScanConfig {
    let mut config = ScanConfig::without_delays();
    config.images_dir = dir.join("images");
    config
}

#[test]
fn test_replayed_profile_end_to_end() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let replay = replay_dir(dir.path(), &[0, 1, 2, 3, 3, 3, 4, 5])?;
    let mut device = ReplayDevice::from_dir(&replay)?;
    let frames = device.frames().to_vec();
    let config = config(dir.path());
    let locator = RowAt {
        frame: Some("frame_02.png"),
        y: 32,
    };

    let scan = ProfileScanner::new(&config, &locator).scan(&mut device, None)?;

    assert_eq!(scan.row_method, ConsensusMethod::DualTemplates);
    assert_eq!(scan.pages_scanned, 2);
    assert_eq!(scan.carousel_frames, 2);

    let carousel = scan.carousel.clone().expect("carousel stitched");
    // two 60 px bands plus a 61 px caption strip
    assert_eq!(image::image_dimensions(&carousel)?, (64, 181));
    assert!(config.carousel.subtext_height(64) > config.carousel.band_height(64));
    assert_eq!(
        scan.manifest.images(),
        &[frames[0].clone(), carousel, frames[6].clone(), frames[7].clone()]
    );
    assert_eq!(device.swipes().len(), 8);
    Ok(())
}

#[test]
fn test_gestures_bounded_when_content_never_settles() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let kinds: Vec<usize> = (0..40).map(|i| i % 8).collect();
    let replay = replay_dir(dir.path(), &kinds)?;
    let mut device = ReplayDevice::from_dir(&replay)?;
    let config = config(dir.path());
    let locator = RowAt { frame: None, y: 32 };

    let scan = ProfileScanner::new(&config, &locator).scan(&mut device, None)?;

    assert_eq!(scan.carousel_frames, config.carousel.max_horizontal_swipes + 1);
    assert_eq!(scan.pages.len(), config.pages.max_vertical_pages + 1);
    // settle + carousel budget + page budget; the row was on the first sweep page
    assert_eq!(
        device.swipes().len(),
        1 + config.carousel.max_horizontal_swipes + config.pages.max_vertical_pages
    );
    assert_eq!(scan.manifest.len(), 1 + 1 + config.pages.max_vertical_pages + 1);
    Ok(())
}

#[test]
fn test_sweep_gives_up_within_page_budget() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let kinds: Vec<usize> = (0..20).map(|i| i % 8).collect();
    let replay = replay_dir(dir.path(), &kinds)?;
    let mut device = ReplayDevice::from_dir(&replay)?;
    let config = config(dir.path());
    let never = RowAt {
        frame: Some("missing.png"),
        y: 0,
    };

    let err = ProfileScanner::new(&config, &never).scan(&mut device, None).unwrap_err();
    match err {
        ScanError::RowNotFound { pages_scanned, .. } => assert_eq!(pages_scanned, config.sweep.max_sweep_pages),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(device.swipes().len(), 1 + config.sweep.max_sweep_pages - 1);
    assert!(!config.images_dir.exists());
    Ok(())
}

#[test]
fn test_manifest_cap_is_never_truncated() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let kinds: Vec<usize> = (0..40).map(|i| i % 8).collect();
    let replay = replay_dir(dir.path(), &kinds)?;
    let mut device = ReplayDevice::from_dir(&replay)?;
    let mut config = config(dir.path());
    config.manifest.max_images = 5;
    let locator = RowAt { frame: None, y: 32 };

    let err = ProfileScanner::new(&config, &locator).scan(&mut device, None).unwrap_err();
    assert!(matches!(err, ScanError::ManifestCapExceeded { actual: 9, cap: 5 }));
    assert!(err.aborts_run());
    Ok(())
}
