//! Row consensus over independent icon detections
//!
//! The biometrics row is only trusted when two independently matched icons
//! sit on the same horizontal line. Among all agreeing pairs the one with the
//! highest summed confidence wins; discovery order never decides.

use serde::{Deserialize, Serialize};

/// One template/scale trial against one ROI. Coordinates are full-frame pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub center_x: i32,
    pub center_y: i32,
    /// Normalized correlation in `[0, 1]`.
    pub confidence: f64,
    pub template_width: i32,
    pub template_height: i32,
    pub top_left: (i32, i32),
    pub scale_used: f64,
    pub template_id: String,
}

impl MatchCandidate {
    pub fn new(template_id: &str, top_left: (i32, i32), size: (i32, i32), confidence: f64) -> Self {
        Self {
            center_x: top_left.0 + size.0 / 2,
            center_y: top_left.1 + size.1 / 2,
            confidence: confidence.clamp(0.0, 1.0),
            template_width: size.0,
            template_height: size.1,
            top_left,
            scale_used: 1.0,
            template_id: template_id.to_string(),
        }
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale_used = scale;
        self
    }
}

/// Best match of one template on one screenshot, gated by its threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateDetection {
    pub template_id: String,
    pub best: Option<MatchCandidate>,
    pub found: bool,
}

impl TemplateDetection {
    pub fn found(candidate: MatchCandidate) -> Self {
        Self {
            template_id: candidate.template_id.clone(),
            best: Some(candidate),
            found: true,
        }
    }

    pub fn below_threshold(template_id: &str, best: Option<MatchCandidate>) -> Self {
        Self {
            template_id: template_id.to_string(),
            best,
            found: false,
        }
    }

    /// Evaluate a best candidate against a confidence threshold.
    pub fn gate(template_id: &str, best: Option<MatchCandidate>, threshold: f64) -> Self {
        match best {
            Some(candidate) if candidate.confidence >= threshold => Self::found(candidate),
            other => Self::below_threshold(template_id, other),
        }
    }

    fn accepted(&self) -> Option<&MatchCandidate> {
        if self.found { self.best.as_ref() } else { None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusMethod {
    TwoOfThree,
    DualTemplates,
    SingleTemplate,
    Edges,
    Override,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusFailure {
    /// No template produced a detection above threshold.
    NoDetections,
    /// Only one of several templates was detected.
    InsufficientDetections,
    /// Two or more detections exist but no pair lies within tolerance.
    NoAgreement,
    /// Exactly two detections whose Y coordinates disagree.
    YMismatch,
    /// Two-template mode with `require_both` and one template missing.
    MissingDetection,
    /// The screenshot could not be decoded.
    Unreadable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RowOutcome {
    Found {
        y: i32,
        method: ConsensusMethod,
        delta_y: Option<i32>,
    },
    NotFound {
        reason: ConsensusFailure,
    },
}

/// Result of one row detection call. Created fresh per call, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowConsensus {
    pub outcome: RowOutcome,
    pub detections: Vec<TemplateDetection>,
    pub tolerance_px: i32,
}

impl RowConsensus {
    pub fn not_found(reason: ConsensusFailure, detections: Vec<TemplateDetection>, tolerance_px: i32) -> Self {
        Self {
            outcome: RowOutcome::NotFound { reason },
            detections,
            tolerance_px,
        }
    }

    pub fn found(&self) -> bool {
        matches!(self.outcome, RowOutcome::Found { .. })
    }

    pub fn y(&self) -> Option<i32> {
        match self.outcome {
            RowOutcome::Found { y, .. } => Some(y),
            RowOutcome::NotFound { .. } => None,
        }
    }

    pub fn method(&self) -> Option<ConsensusMethod> {
        match self.outcome {
            RowOutcome::Found { method, .. } => Some(method),
            RowOutcome::NotFound { .. } => None,
        }
    }

    pub fn failure(&self) -> Option<ConsensusFailure> {
        match self.outcome {
            RowOutcome::Found { .. } => None,
            RowOutcome::NotFound { reason } => Some(reason),
        }
    }
}

/// Agreement tolerance: the larger of an absolute pixel value and a
/// fraction of the screen height.
pub fn tolerance_px(absolute_px: i32, ratio: f64, screen_height: u32) -> i32 {
    absolute_px.max((ratio * screen_height as f64).round() as i32)
}

fn mean_y(values: &[i32]) -> i32 {
    let sum: i64 = values.iter().map(|&v| v as i64).sum();
    (sum as f64 / values.len() as f64).round() as i32
}

/// Dispatch on the number of templates: three or more use pairwise
/// agreement, two use the dual check, one gates directly on its threshold.
pub fn resolve(detections: Vec<TemplateDetection>, tolerance_px: i32, require_both: bool) -> RowConsensus {
    match detections.len() {
        0 => RowConsensus::not_found(ConsensusFailure::NoDetections, detections, tolerance_px),
        1 => single_template(detections, tolerance_px),
        2 => dual_templates(detections, tolerance_px, require_both),
        _ => two_of_three(detections, tolerance_px),
    }
}

/// Pairwise agreement with a best-joint-confidence tie-break.
///
/// Every pair of accepted detections whose centres differ by at most
/// `tolerance_px` is scored by summed confidence; the best pair sets the row.
/// Any other accepted detection within tolerance of that pair's mean is folded
/// into a running average.
pub fn two_of_three(detections: Vec<TemplateDetection>, tolerance_px: i32) -> RowConsensus {
    let accepted: Vec<&MatchCandidate> = detections.iter().filter_map(|d| d.accepted()).collect();

    match accepted.len() {
        0 => return RowConsensus::not_found(ConsensusFailure::NoDetections, detections, tolerance_px),
        1 => {
            return RowConsensus::not_found(ConsensusFailure::InsufficientDetections, detections, tolerance_px);
        }
        _ => {}
    }

    let mut best: Option<(usize, usize, f64)> = None;
    for i in 0..accepted.len() {
        for j in (i + 1)..accepted.len() {
            let delta = (accepted[i].center_y - accepted[j].center_y).abs();
            if delta > tolerance_px {
                continue;
            }
            let score = accepted[i].confidence + accepted[j].confidence;
            if best.is_none_or(|(_, _, s)| score > s) {
                best = Some((i, j, score));
            }
        }
    }

    let Some((i, j, _)) = best else {
        return RowConsensus::not_found(ConsensusFailure::NoAgreement, detections, tolerance_px);
    };

    let delta_y = (accepted[i].center_y - accepted[j].center_y).abs();
    let mut ys = vec![accepted[i].center_y, accepted[j].center_y];
    let mut y = mean_y(&ys);
    for (k, candidate) in accepted.iter().enumerate() {
        if k == i || k == j {
            continue;
        }
        if (candidate.center_y - y).abs() <= tolerance_px {
            ys.push(candidate.center_y);
            y = mean_y(&ys);
        }
    }

    RowConsensus {
        outcome: RowOutcome::Found {
            y,
            method: ConsensusMethod::TwoOfThree,
            delta_y: Some(delta_y),
        },
        detections,
        tolerance_px,
    }
}

/// Exactly two templates that must agree within tolerance.
pub fn dual_templates(detections: Vec<TemplateDetection>, tolerance_px: i32, require_both: bool) -> RowConsensus {
    let first = detections.first().and_then(|d| d.accepted()).cloned();
    let second = detections.get(1).and_then(|d| d.accepted()).cloned();

    match (first, second) {
        (Some(a), Some(b)) => {
            let delta_y = (a.center_y - b.center_y).abs();
            if delta_y <= tolerance_px {
                RowConsensus {
                    outcome: RowOutcome::Found {
                        y: mean_y(&[a.center_y, b.center_y]),
                        method: ConsensusMethod::DualTemplates,
                        delta_y: Some(delta_y),
                    },
                    detections,
                    tolerance_px,
                }
            } else {
                RowConsensus::not_found(ConsensusFailure::YMismatch, detections, tolerance_px)
            }
        }
        (None, None) => RowConsensus::not_found(ConsensusFailure::NoDetections, detections, tolerance_px),
        (Some(only), None) | (None, Some(only)) => {
            if require_both {
                RowConsensus::not_found(ConsensusFailure::MissingDetection, detections, tolerance_px)
            } else {
                RowConsensus {
                    outcome: RowOutcome::Found {
                        y: only.center_y,
                        method: ConsensusMethod::SingleTemplate,
                        delta_y: None,
                    },
                    detections,
                    tolerance_px,
                }
            }
        }
    }
}

/// One template: its own threshold gate is the whole decision.
pub fn single_template(detections: Vec<TemplateDetection>, tolerance_px: i32) -> RowConsensus {
    match detections.first().and_then(|d| d.accepted()).map(|c| c.center_y) {
        Some(y) => RowConsensus {
            outcome: RowOutcome::Found {
                y,
                method: ConsensusMethod::SingleTemplate,
                delta_y: None,
            },
            detections,
            tolerance_px,
        },
        None => RowConsensus::not_found(ConsensusFailure::NoDetections, detections, tolerance_px),
    }
}
