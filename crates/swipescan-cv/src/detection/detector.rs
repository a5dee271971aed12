//! Biometrics row detector
//!
//! Matches each row icon independently, then lets row consensus decide
//! whether they agree on a Y coordinate.

use super::config::{DebugConfig, RowDetectionConfig};
use super::edges;
use crate::Result;
use crate::candidates::MatchBox;
use crate::template::{MatchParams, MatchReport, Template, TemplateLoader, TemplateMatcher};
use crate::utils::ImageUtils;
use anyhow::Context;
use log::{debug, info, warn};
use opencv::{
    core::{Mat, Point, Rect, Scalar},
    imgproc::{self, FONT_HERSHEY_SIMPLEX, LINE_8},
    prelude::*,
};
use std::path::{Path, PathBuf};
use swipescan_core::consensus::{self, ConsensusFailure, ConsensusMethod, RowConsensus, RowOutcome};
use swipescan_core::{RowLocator, TemplateDetection};

/// Overlay color per row icon
fn template_color(name: &str) -> (u8, u8, u8) {
    match name {
        "age" => (255, 64, 64),
        "gender" => (64, 200, 64),
        "height" => (64, 96, 255),
        _ => (255, 200, 0),
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "screenshot".to_string())
}

/// Row detection over a fixed set of icon templates
pub struct RowDetector {
    config: RowDetectionConfig,
    /// Expected icons, in configured order.
    names: Vec<String>,
    templates: Vec<Template>,
}

impl RowDetector {
    /// Load the configured icons from the asset directory. Missing icons are
    /// logged and count as never detected.
    pub fn new(config: RowDetectionConfig) -> Self {
        let loader = TemplateLoader::new().add_asset_dir(&config.asset_dir);
        let names = config.templates.clone();
        let templates: Vec<Template> = loader
            .load_icons(&names)
            .into_iter()
            .filter_map(|(_, template)| template)
            .collect();
        info!(
            "Row detector ready: {}/{} templates from {:?}",
            templates.len(),
            names.len(),
            config.asset_dir
        );
        Self {
            config,
            names,
            templates,
        }
    }

    /// Use already-loaded templates instead of the asset directory
    pub fn with_templates(config: RowDetectionConfig, templates: Vec<Template>) -> Self {
        let names = templates.iter().map(|t| t.name.clone()).collect();
        Self {
            config,
            names,
            templates,
        }
    }

    pub fn config(&self) -> &RowDetectionConfig {
        &self.config
    }

    /// Detect the row on a screenshot file.
    pub fn detect_row<P: AsRef<Path>>(&self, screenshot: P, threshold: f64) -> Result<RowConsensus> {
        let path = screenshot.as_ref();
        let gray = ImageUtils::load_grayscale(path)?;
        let (consensus, reports) = self.detect_row_mat(&gray, threshold)?;

        if self.config.debug.save_debug {
            if let Err(e) = self.write_debug(path, &consensus, &reports) {
                warn!("Failed to write debug overlay for {:?}: {:#}", path, e);
            }
        }
        Ok(consensus)
    }

    /// Detect the row on a grayscale Mat, returning the per-template reports too.
    pub fn detect_row_mat(&self, gray: &Mat, threshold: f64) -> Result<(RowConsensus, Vec<MatchReport>)> {
        let matcher = TemplateMatcher::new(self.config.match_params.clone().with_threshold(threshold));
        let reports = matcher.match_multiple(gray, &self.templates)?;

        let detections: Vec<TemplateDetection> = self
            .names
            .iter()
            .map(|name| {
                reports
                    .iter()
                    .find(|report| &report.template_id == name)
                    .map(MatchReport::detection)
                    .unwrap_or_else(|| TemplateDetection::below_threshold(name, None))
            })
            .collect();

        let height = gray.rows().max(0) as u32;
        let tolerance = consensus::tolerance_px(self.config.tolerance_px, self.config.tolerance_ratio, height);
        let mut result = consensus::resolve(detections, tolerance, self.config.require_both);

        if !result.found() && self.config.edges_fallback.enabled {
            if let Some(y) = edges::strongest_edge_row(gray, &self.config.edges_fallback)? {
                debug!("Template consensus failed ({:?}); edge fallback at y={}", result.failure(), y);
                result.outcome = RowOutcome::Found {
                    y,
                    method: ConsensusMethod::Edges,
                    delta_y: None,
                };
            }
        }

        debug!("Row consensus: {:?}", result.outcome);
        Ok((result, reports))
    }

    fn write_debug(&self, screenshot: &Path, consensus: &RowConsensus, reports: &[MatchReport]) -> Result<()> {
        let stem = file_stem(screenshot);
        let dir = &self.config.debug.debug_dir;
        let color = ImageUtils::load_color(screenshot)?;

        for report in reports {
            let base = format!("{}_{}", stem, report.template_id);
            save_match_overlay(&color, report, &dir.join(format!("{}_match.png", base)))?;
            report.candidates.write_sidecar(
                &dir.join(format!("{}_top{}.json", base, self.config.match_params.top_k)),
                serde_json::json!({
                    "screenshot": screenshot,
                    "template": report.template_id,
                    "threshold": report.threshold,
                    "roi": report.roi,
                    "domain": report.domain,
                    "scales": report.scales,
                }),
            )?;
        }

        let path = dir.join(format!("{}_consensus.png", stem));
        save_consensus_overlay(&color, consensus, reports, &path)?;
        debug!("Debug overlays written for {:?}", screenshot);
        Ok(())
    }
}

impl RowLocator for RowDetector {
    fn locate_row(&self, screenshot: &Path, threshold: f64) -> RowConsensus {
        match self.detect_row(screenshot, threshold) {
            Ok(consensus) => consensus,
            Err(e) => {
                warn!("Row detection failed on {:?}: {:#}", screenshot, e);
                RowConsensus::not_found(ConsensusFailure::Unreadable, Vec::new(), self.config.tolerance_px)
            }
        }
    }
}

fn draw_roi(output: &mut Mat, roi: (i32, i32)) -> Result<()> {
    let width = output.cols();
    let roi_color = Scalar::new(200.0, 200.0, 200.0, 255.0);
    for y in [roi.0, roi.1.saturating_sub(1)] {
        imgproc::line(output, Point::new(0, y), Point::new(width - 1, y), roi_color, 2, LINE_8, 0)?;
    }
    Ok(())
}

fn draw_box(output: &mut Mat, candidate: &MatchBox, thickness: i32) -> Result<()> {
    let color = candidate.get_bgr_scalar();
    imgproc::rectangle(output, candidate.to_rect(), color, thickness, LINE_8, 0)?;
    imgproc::put_text(
        output,
        &format!("{} ({:.2})", candidate.template_id, candidate.confidence),
        Point::new(candidate.x, (candidate.y - 6).max(12)),
        FONT_HERSHEY_SIMPLEX,
        0.6,
        color,
        2,
        LINE_8,
        false,
    )?;
    Ok(())
}

/// ROI bounds plus the best box of one template.
pub fn save_match_overlay(color: &Mat, report: &MatchReport, path: &Path) -> Result<()> {
    let mut output = color.try_clone()?;
    draw_roi(&mut output, report.roi)?;

    if let Some(best) = &report.best {
        let best = best.clone().with_color(template_color(&report.template_id));
        draw_box(&mut output, &best, if report.found { 3 } else { 1 })?;
    }

    ImageUtils::save_overlay(&output, path)
}

/// All templates' top candidates in distinct colors plus the consensus line.
pub fn save_consensus_overlay(
    color: &Mat,
    consensus: &RowConsensus,
    reports: &[MatchReport],
    path: &Path,
) -> Result<()> {
    let mut output = color.try_clone()?;
    if let Some(first) = reports.first() {
        draw_roi(&mut output, first.roi)?;
    }

    for report in reports {
        for candidate in report.candidates.iter() {
            let candidate = candidate.clone().with_color(template_color(&report.template_id));
            draw_box(&mut output, &candidate, 1)?;
        }
    }

    let width = output.cols();
    match consensus.outcome {
        RowOutcome::Found { y, method, .. } => {
            let line_color = Scalar::new(0.0, 255.0, 255.0, 255.0);
            imgproc::line(&mut output, Point::new(0, y), Point::new(width - 1, y), line_color, 3, LINE_8, 0)?;
            imgproc::put_text(
                &mut output,
                &format!("row y={} ({:?})", y, method),
                Point::new(10, (y - 10).max(20)),
                FONT_HERSHEY_SIMPLEX,
                0.8,
                line_color,
                2,
                LINE_8,
                false,
            )?;
        }
        RowOutcome::NotFound { reason } => {
            let banner = Rect::new(0, 0, width, 36);
            imgproc::rectangle(&mut output, banner, Scalar::new(0.0, 0.0, 0.0, 255.0), -1, LINE_8, 0)?;
            imgproc::put_text(
                &mut output,
                &format!("row not found: {:?}", reason),
                Point::new(10, 26),
                FONT_HERSHEY_SIMPLEX,
                0.8,
                Scalar::new(0.0, 0.0, 255.0, 255.0),
                2,
                LINE_8,
                false,
            )?;
        }
    }

    ImageUtils::save_overlay(&output, path)
}

/// One-off lookup of any icon (buttons, fields, ticks) on a screenshot.
pub fn find_icon(screenshot: &Path, template: &Template, params: MatchParams, debug: &DebugConfig) -> Result<MatchReport> {
    let report = TemplateMatcher::new(params)
        .match_file(screenshot, template)
        .with_context(|| format!("Icon lookup failed on {:?}", screenshot))?;

    if debug.save_debug {
        let path: PathBuf = debug
            .debug_dir
            .join(format!("{}_{}_match.png", file_stem(screenshot), template.name));
        let color = ImageUtils::load_color(screenshot)?;
        save_match_overlay(&color, &report, &path)?;
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, imageops};

    fn glyph(size: u32, phase: u32) -> GrayImage {
        let margin = size / 4;
        GrayImage::from_fn(size, size, |x, y| {
            let inside = (margin..size - margin).contains(&x) && (margin..size - margin).contains(&y);
            if !inside {
                Luma([255])
            } else if ((x - margin) / (3 + phase) + (y - margin) / 4) % 2 == 0 {
                Luma([50])
            } else {
                Luma([140])
            }
        })
    }

    fn detector(templates: Vec<Template>) -> RowDetector {
        let config = RowDetectionConfig {
            match_params: MatchParams {
                roi_bottom: 1.0,
                use_edges: false,
                scales: Some(vec![1.0]),
                ..Default::default()
            },
            ..Default::default()
        };
        RowDetector::with_templates(config, templates)
    }

    fn icons() -> Result<Vec<Template>> {
        ["age", "gender", "height"]
            .iter()
            .enumerate()
            .map(|(i, name)| Ok(Template::new(name, ImageUtils::gray_to_mat(&glyph(32, i as u32))?)))
            .collect()
    }

    #[test]
    fn test_three_icons_on_one_row() -> Result<()> {
        let mut screen = GrayImage::from_pixel(300, 400, Luma([255]));
        for (i, phase) in [0u32, 1, 2].into_iter().enumerate() {
            imageops::replace(&mut screen, &glyph(32, phase), 20 + 90 * i as i64, 150 + i as i64 * 2);
        }
        let gray = ImageUtils::gray_to_mat(&screen)?;

        let (consensus, reports) = detector(icons()?).detect_row_mat(&gray, 0.97)?;
        assert_eq!(reports.len(), 3);
        assert_eq!(consensus.method(), Some(ConsensusMethod::TwoOfThree));
        assert_eq!(consensus.y(), Some(168));
        Ok(())
    }

    #[test]
    fn test_blank_screen_is_not_found() -> Result<()> {
        let gray = ImageUtils::gray_to_mat(&GrayImage::from_pixel(300, 400, Luma([255])))?;
        let (consensus, _) = detector(icons()?).detect_row_mat(&gray, 0.97)?;
        assert_eq!(consensus.failure(), Some(ConsensusFailure::NoDetections));
        Ok(())
    }

    #[test]
    fn test_missing_assets_never_detect() -> Result<()> {
        let detector = RowDetector::new(RowDetectionConfig {
            asset_dir: "/nonexistent/assets".into(),
            ..Default::default()
        });
        let gray = ImageUtils::gray_to_mat(&glyph(64, 0))?;

        let (consensus, reports) = detector.detect_row_mat(&gray, 0.5)?;
        assert!(reports.is_empty());
        assert_eq!(consensus.detections.len(), 3);
        assert_eq!(consensus.failure(), Some(ConsensusFailure::NoDetections));
        Ok(())
    }

    #[test]
    fn test_unreadable_screenshot_downgrades_to_not_found() -> Result<()> {
        let consensus = detector(icons()?).locate_row(Path::new("/nonexistent/shot.png"), 0.7);
        assert_eq!(consensus.failure(), Some(ConsensusFailure::Unreadable));
        Ok(())
    }

    #[test]
    fn test_debug_overlays_written() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut screen = GrayImage::from_pixel(300, 400, Luma([255]));
        imageops::replace(&mut screen, &glyph(32, 0), 40, 100);
        let shot = dir.path().join("shot.png");
        screen.save(&shot)?;

        let mut detector = detector(icons()?);
        detector.config.debug = DebugConfig {
            save_debug: true,
            debug_dir: dir.path().join("debug"),
        };
        let consensus = detector.detect_row(&shot, 0.97)?;
        assert!(!consensus.found());
        assert!(dir.path().join("debug/shot_consensus.png").is_file());
        assert!(dir.path().join("debug/shot_age_match.png").is_file());
        assert!(dir.path().join("debug/shot_gender_match.png").is_file());
        Ok(())
    }
}
