//! Multi-scale template matching inside a vertical band of the screenshot

use super::{MatchDomain, MatchParams, Template};
use crate::Result;
use crate::candidates::{CandidateSet, MatchBox};
use crate::utils::ImageUtils;
use anyhow::Context;
use log::{debug, trace};
use opencv::{
    core::{self, Mat, Point, Rect, Size},
    imgproc,
    prelude::*,
};
use serde::Serialize;
use std::path::Path;
use swipescan_core::TemplateDetection;

/// Outcome of matching one template against one screenshot
#[derive(Debug, Clone, Serialize)]
pub struct MatchReport {
    pub template_id: String,
    pub best: Option<MatchBox>,
    /// Strongest distinct trial peaks across all scales, for diagnostics.
    pub candidates: CandidateSet,
    pub found: bool,
    pub threshold: f64,
    /// Searched rows `[y0, y1)` in screenshot coordinates.
    pub roi: (i32, i32),
    pub domain: MatchDomain,
    pub scales: Vec<f64>,
}

impl MatchReport {
    fn empty(template_id: &str, threshold: f64, roi: (i32, i32), domain: MatchDomain) -> Self {
        Self {
            template_id: template_id.to_string(),
            best: None,
            candidates: CandidateSet::new(),
            found: false,
            threshold,
            roi,
            domain,
            scales: Vec::new(),
        }
    }

    pub fn detection(&self) -> TemplateDetection {
        TemplateDetection::gate(
            &self.template_id,
            self.best.as_ref().map(MatchBox::to_candidate),
            self.threshold,
        )
    }
}

/// Scale samples for a template of `template_height` pixels: `steps` values
/// evenly spread over `base * (1 ± tolerance)`, `base = expected_px / height`,
/// keeping only those whose resulting height lies in `[min_px, max_px]`.
pub fn derive_scales(params: &MatchParams, template_height: i32, roi_height: i32) -> Vec<f64> {
    if template_height <= 0 || params.expected_px <= 0.0 {
        return Vec::new();
    }
    let base = params.expected_px / template_height as f64;
    let low = base * (1.0 - params.scale_tolerance).max(0.0);
    let high = base * (1.0 + params.scale_tolerance);
    let steps = params.scale_steps.max(1);
    let max_px = params.max_roi_frac * roi_height as f64;

    (0..steps)
        .map(|i| {
            if steps == 1 {
                base
            } else {
                low + (high - low) * i as f64 / (steps - 1) as f64
            }
        })
        .filter(|&scale| {
            let px = template_height as f64 * scale;
            px >= params.min_px as f64 && px <= max_px
        })
        .collect()
}

/// Canny hysteresis thresholds around the median intensity.
pub fn canny_thresholds(median: f64) -> (f64, f64) {
    let low = ((1.0 - 0.33) * median).max(0.0);
    let high = ((1.0 + 0.33) * median).min(255.0);
    (low, high)
}

/// Up to `k` peaks of a row-major score map, strongest first. After each
/// pick, the `suppress` neighbourhood around it is zeroed. Non-finite scores
/// count as zero.
pub fn top_peaks(
    scores: &[f32],
    cols: usize,
    k: usize,
    min_conf: f64,
    suppress: (usize, usize),
) -> Vec<(usize, usize, f64)> {
    let mut local: Vec<f32> = scores
        .iter()
        .map(|&v| if v.is_finite() { v } else { 0.0 })
        .collect();
    if cols == 0 {
        return Vec::new();
    }
    let rows = local.len() / cols;
    let mut peaks = Vec::new();

    for _ in 0..k {
        let Some((index, &value)) = local
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1).then(b.0.cmp(&a.0)))
        else {
            break;
        };
        if (value as f64) < min_conf {
            break;
        }
        let (px, py) = (index % cols, index / cols);
        peaks.push((px, py, value as f64));

        let x0 = px.saturating_sub(suppress.0 / 2);
        let y0 = py.saturating_sub(suppress.1 / 2);
        let x1 = (px + suppress.0 / 2).min(cols).max(px + 1);
        let y1 = (py + suppress.1 / 2).min(rows).max(py + 1);
        for y in y0..y1 {
            local[y * cols + x0..y * cols + x1].fill(0.0);
        }
    }
    peaks
}

fn median_intensity(gray: &Mat) -> Result<f64> {
    let bytes = gray.data_bytes().context("Mat is not continuous")?;
    if bytes.is_empty() {
        return Ok(0.0);
    }
    let mut histogram = [0usize; 256];
    for &b in bytes {
        histogram[b as usize] += 1;
    }
    let middle = bytes.len() / 2;
    let mut seen = 0;
    for (value, count) in histogram.iter().enumerate() {
        seen += count;
        if seen > middle {
            return Ok(value as f64);
        }
    }
    Ok(255.0)
}

/// OpenCV-based template matcher with scale sweep
pub struct TemplateMatcher {
    params: MatchParams,
}

impl TemplateMatcher {
    pub fn new(params: MatchParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &MatchParams {
        &self.params
    }

    /// Searched rows for a screenshot of `height` pixels.
    pub fn roi_bounds(&self, height: i32) -> (i32, i32) {
        let y0 = ((height as f64 * self.params.roi_top) as i32).clamp(0, height);
        let y1 = ((height as f64 * self.params.roi_bottom) as i32).clamp(0, height);
        (y0, y1.max(y0))
    }

    fn scales_for(&self, template: &Template, roi: &Mat) -> Vec<f64> {
        match &self.params.scales {
            Some(scales) => scales.clone(),
            None => derive_scales(&self.params, template.height(), roi.rows()),
        }
    }

    /// Canny edges with median-derived thresholds, optionally dilated
    fn edges(&self, gray: &Mat) -> Result<Mat> {
        let (low, high) = canny_thresholds(median_intensity(gray)?);
        let mut edges = Mat::default();
        imgproc::canny(gray, &mut edges, low, high, 3, false).context("Canny failed")?;

        if self.params.edges_dilate_iter <= 0 {
            return Ok(edges);
        }
        let kernel = imgproc::get_structuring_element(
            imgproc::MORPH_RECT,
            Size::new(3, 3),
            Point::new(-1, -1),
        )?;
        let mut dilated = Mat::default();
        imgproc::dilate(
            &edges,
            &mut dilated,
            &kernel,
            Point::new(-1, -1),
            self.params.edges_dilate_iter,
            core::BORDER_CONSTANT,
            imgproc::morphology_default_border_value()?,
        )?;
        Ok(dilated)
    }

    fn resize(image: &Mat, width: i32, height: i32, interpolation: i32) -> Result<Mat> {
        let mut scaled = Mat::default();
        imgproc::resize(
            image,
            &mut scaled,
            Size::new(width, height),
            0.0,
            0.0,
            interpolation,
        )?;
        Ok(scaled)
    }

    /// Stroke mask: everything that is not near-white.
    fn stroke_mask(template: &Mat) -> Result<Mat> {
        let mut mask = Mat::default();
        imgproc::threshold(template, &mut mask, 250.0, 255.0, imgproc::THRESH_BINARY_INV)?;
        Ok(mask)
    }

    fn score_map(&self, roi: &Mat, roi_edges: Option<&Mat>, template: &Template, width: i32, height: i32) -> Result<Mat> {
        let scaled = Self::resize(&template.image, width, height, imgproc::INTER_AREA)?;
        let mut result = Mat::default();

        match roi_edges {
            Some(roi_edges) => {
                let template_edges = self.edges(&scaled)?;
                imgproc::match_template(
                    roi_edges,
                    &template_edges,
                    &mut result,
                    imgproc::TM_CCOEFF_NORMED,
                    &core::no_array(),
                )
                .context("Edge template matching failed")?;
            }
            None => {
                let mask = match &template.mask {
                    Some(alpha) => Self::resize(alpha, width, height, imgproc::INTER_NEAREST)?,
                    None => Self::stroke_mask(&scaled)?,
                };
                imgproc::match_template(roi, &scaled, &mut result, imgproc::TM_CCORR_NORMED, &mask)
                    .context("Masked template matching failed")?;
            }
        }
        Ok(result)
    }

    /// Match `template` inside the configured ROI of a grayscale screenshot.
    ///
    /// Never fails for "not found": a below-threshold best match is a normal
    /// report with `found == false`.
    pub fn match_in_roi(&self, screenshot: &Mat, template: &Template) -> Result<MatchReport> {
        let domain = self.params.domain();
        let (y0, y1) = self.roi_bounds(screenshot.rows());
        let mut report = MatchReport::empty(&template.name, self.params.threshold, (y0, y1), domain);
        if y1 - y0 < 2 || screenshot.cols() < 2 || template.height() <= 0 || template.width() <= 0 {
            return Ok(report);
        }

        let roi = Mat::roi(screenshot, Rect::new(0, y0, screenshot.cols(), y1 - y0))?.try_clone()?;
        let roi_edges = match domain {
            MatchDomain::Edges => Some(self.edges(&roi)?),
            MatchDomain::Grayscale => None,
        };

        let mut candidates = CandidateSet::new();
        for scale in self.scales_for(template, &roi) {
            let width = ((template.width() as f64 * scale) as i32).max(1);
            let height = ((template.height() as f64 * scale) as i32).max(1);
            if width <= 1 || height <= 1 || height > roi.rows() || width > roi.cols() {
                trace!("{}: skipping scale {:.3} ({}x{})", template.name, scale, width, height);
                continue;
            }
            report.scales.push(scale);

            let scores = self.score_map(&roi, roi_edges.as_ref(), template, width, height)?;
            let values = scores.data_typed::<f32>().context("Unexpected score map type")?;
            let peaks = top_peaks(
                values,
                scores.cols() as usize,
                self.params.top_k.max(1),
                f64::NEG_INFINITY,
                (width as usize, height as usize),
            );
            for (px, py, confidence) in peaks {
                candidates.push(
                    MatchBox::new(px as i32, y0 + py as i32, width, height, confidence)
                        .with_template(&template.name, scale),
                );
            }
        }

        report.best = candidates.best().cloned();
        report.found = report
            .best
            .as_ref()
            .is_some_and(|best| best.confidence >= self.params.threshold);
        report.candidates = candidates.top_k(self.params.top_k, self.params.nms_threshold);

        debug!(
            "{}: best {:.3} over {} scale(s), found={}",
            template.name,
            report.best.as_ref().map_or(0.0, |b| b.confidence),
            report.scales.len(),
            report.found
        );
        Ok(report)
    }

    /// Match several templates against one screenshot
    pub fn match_multiple(&self, screenshot: &Mat, templates: &[Template]) -> Result<Vec<MatchReport>> {
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            templates
                .par_iter()
                .map(|template| self.match_in_roi(screenshot, template))
                .collect()
        }

        #[cfg(not(feature = "parallel"))]
        {
            templates
                .iter()
                .map(|template| self.match_in_roi(screenshot, template))
                .collect()
        }
    }

    pub fn match_file<P: AsRef<Path>>(&self, screenshot: P, template: &Template) -> Result<MatchReport> {
        let image = ImageUtils::load_grayscale(&screenshot)?;
        self.match_in_roi(&image, template)
    }
}

impl Default for TemplateMatcher {
    fn default() -> Self {
        Self::new(MatchParams::default())
    }
}
