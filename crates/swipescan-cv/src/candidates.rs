//! Match candidates and suppression
//!
//! Every trial peak of a template match becomes a [`MatchBox`]. A
//! [`CandidateSet`] gathers them across scales and reduces them to the
//! top-K diagnostics and the single best candidate handed to consensus.

use crate::Result;
use anyhow::Context;
use opencv::core::{Point, Rect, Scalar};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use swipescan_core::MatchCandidate;

/// One matched location in full-screenshot coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub confidence: f64,
    pub template_id: String,
    pub scale: f64,
    pub color: (u8, u8, u8),
}

impl MatchBox {
    pub fn new(x: i32, y: i32, width: i32, height: i32, confidence: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            confidence,
            template_id: String::new(),
            scale: 1.0,
            color: (255, 255, 255),
        }
    }

    pub fn with_template(mut self, template_id: &str, scale: f64) -> Self {
        self.template_id = template_id.to_string();
        self.scale = scale;
        self
    }

    pub fn with_color(mut self, color: (u8, u8, u8)) -> Self {
        self.color = color;
        self
    }

    pub fn to_rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }

    pub fn area(&self) -> f64 {
        (self.width * self.height) as f64
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2, self.y + self.height / 2)
    }

    /// Intersection over union with another box
    pub fn iou(&self, other: &MatchBox) -> f64 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        if x2 <= x1 || y2 <= y1 {
            return 0.0;
        }

        let intersection = ((x2 - x1) * (y2 - y1)) as f64;
        let union = self.area() + other.area() - intersection;

        intersection / union
    }

    pub fn overlaps(&self, other: &MatchBox, threshold: f64) -> bool {
        self.iou(other) > threshold
    }

    /// OpenCV color scalar (BGR)
    pub fn get_bgr_scalar(&self) -> Scalar {
        Scalar::new(
            self.color.2 as f64,
            self.color.1 as f64,
            self.color.0 as f64,
            255.0,
        )
    }

    /// The geometry handed to row consensus.
    pub fn to_candidate(&self) -> MatchCandidate {
        MatchCandidate::new(
            &self.template_id,
            (self.x, self.y),
            (self.width, self.height),
            self.confidence,
        )
        .with_scale(self.scale)
    }
}

/// Candidates for one template across every trial scale
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidateSet {
    boxes: Vec<MatchBox>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(boxes: Vec<MatchBox>) -> Self {
        Self { boxes }
    }

    pub fn push(&mut self, candidate: MatchBox) {
        self.boxes.push(candidate);
    }

    pub fn extend(&mut self, other: CandidateSet) {
        self.boxes.extend(other.boxes);
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// Sort by confidence (descending)
    pub fn sort_by_confidence(&mut self) {
        self.boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    }

    /// Non-maximum suppression, strongest first.
    pub fn apply_nms(mut self, threshold: f64) -> Self {
        self.sort_by_confidence();

        let mut kept: Vec<MatchBox> = Vec::with_capacity(self.boxes.len());
        for candidate in self.boxes {
            if kept.iter().all(|winner| !winner.overlaps(&candidate, threshold)) {
                kept.push(candidate);
            }
        }
        Self::from_vec(kept)
    }

    /// The `k` strongest after suppression.
    pub fn top_k(self, k: usize, nms_threshold: f64) -> Self {
        let mut result = self.apply_nms(nms_threshold);
        result.boxes.truncate(k);
        result
    }

    /// Highest-confidence candidate regardless of threshold.
    pub fn best(&self) -> Option<&MatchBox> {
        self.boxes
            .iter()
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
    }

    pub fn stats(&self) -> CandidateStats {
        let mut template_counts: HashMap<String, usize> = HashMap::new();
        for candidate in &self.boxes {
            *template_counts.entry(candidate.template_id.clone()).or_default() += 1;
        }

        let confidences = self.boxes.iter().map(|c| c.confidence);
        let total = self.boxes.len();
        CandidateStats {
            total,
            template_counts,
            avg_confidence: if total == 0 { 0.0 } else { confidences.clone().sum::<f64>() / total as f64 },
            max_confidence: confidences.clone().fold(0.0, f64::max),
            min_confidence: confidences.reduce(f64::min).unwrap_or(0.0),
        }
    }

    /// Write the candidates plus `meta` as a pretty JSON sidecar.
    pub fn write_sidecar(&self, path: &Path, meta: serde_json::Value) -> Result<()> {
        let payload = serde_json::json!({
            "meta": meta,
            "stats": self.stats(),
            "candidates": self.boxes,
        });
        let json = serde_json::to_string_pretty(&payload).context("Failed to serialize candidates")?;

        std::fs::write(path, json).with_context(|| format!("Failed to write sidecar: {:?}", path))?;

        Ok(())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MatchBox> {
        self.boxes.iter()
    }
}

impl IntoIterator for CandidateSet {
    type Item = MatchBox;
    type IntoIter = std::vec::IntoIter<MatchBox>;

    fn into_iter(self) -> Self::IntoIter {
        self.boxes.into_iter()
    }
}

impl FromIterator<MatchBox> for CandidateSet {
    fn from_iter<T: IntoIterator<Item = MatchBox>>(iter: T) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateStats {
    pub total: usize,
    pub template_counts: HashMap<String, usize>,
    pub avg_confidence: f64,
    pub max_confidence: f64,
    pub min_confidence: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iou() {
        let a = MatchBox::new(0, 0, 10, 10, 0.9);
        let b = MatchBox::new(5, 5, 10, 10, 0.8);

        let iou = a.iou(&b);
        assert!(iou > 0.0 && iou < 1.0);
        assert_eq!(a.iou(&MatchBox::new(50, 50, 10, 10, 0.1)), 0.0);
    }

    #[test]
    fn test_top_k_keeps_strongest_distinct() {
        let set: CandidateSet = vec![
            MatchBox::new(0, 0, 10, 10, 0.7).with_template("age", 1.0),
            MatchBox::new(1, 1, 10, 10, 0.9).with_template("age", 1.1),
            MatchBox::new(40, 0, 10, 10, 0.8).with_template("age", 1.0),
            MatchBox::new(80, 0, 10, 10, 0.6).with_template("age", 1.0),
        ]
        .into_iter()
        .collect();

        let best = set.best().unwrap().clone();
        assert_eq!(best.confidence, 0.9);

        let top = set.top_k(2, 0.3);
        let confidences: Vec<f64> = top.iter().map(|c| c.confidence).collect();
        assert_eq!(confidences, vec![0.9, 0.8]);
    }

    #[test]
    fn test_candidate_conversion_uses_centre() {
        let candidate = MatchBox::new(100, 200, 40, 30, 0.85)
            .with_template("height", 0.9)
            .to_candidate();
        assert_eq!(candidate.center_x, 120);
        assert_eq!(candidate.center_y, 215);
        assert_eq!(candidate.template_id, "height");
        assert_eq!(candidate.scale_used, 0.9);
    }

    #[test]
    fn test_sidecar_is_valid_json() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("age_top3.json");
        let set = CandidateSet::from_vec(vec![MatchBox::new(1, 2, 3, 4, 0.5).with_template("age", 1.0)]);
        set.write_sidecar(&path, serde_json::json!({ "template": "age" }))?;

        let parsed: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        assert_eq!(parsed["candidates"][0]["template_id"], "age");
        assert_eq!(parsed["stats"]["total"], 1);
        Ok(())
    }
}
