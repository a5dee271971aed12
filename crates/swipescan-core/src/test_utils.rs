//! Synthetic frames and scripted collaborators shared by unit tests.

use crate::Result;
use crate::consensus::{
    ConsensusFailure, ConsensusMethod, RowConsensus, RowOutcome, TemplateDetection,
};
use crate::device::RowLocator;
use image::{GrayImage, Luma};
use std::cell::RefCell;
use std::path::{Path, PathBuf};

/// One frame per entry of `kinds`. Frames of equal kind hash identically and
/// frames of different kinds are at least 16 bits apart on an 8x8 hash.
pub fn stripe_frames(dir: &Path, kinds: &[u32], width: u32, height: u32) -> Result<Vec<PathBuf>> {
    kinds
        .iter()
        .enumerate()
        .map(|(i, &kind)| {
            let path = dir.join(format!("frame_{i:02}.png"));
            stripe_image(kind, width, height).save(&path)?;
            Ok(path)
        })
        .collect()
}

pub fn stripe_image(kind: u32, width: u32, height: u32) -> GrayImage {
    let cell_w = (width / 8).max(1);
    let cell_h = (height / 8).max(1);
    GrayImage::from_fn(width, height, |x, y| {
        let (cx, cy) = (x / cell_w, y / cell_h);
        let stripe = match kind % 4 {
            0 => cx,
            1 => cy,
            2 => cx + cy,
            _ => (cx / 2) * (cy / 2) + 1,
        };
        Luma([if (stripe + kind / 4) % 2 == 0 { 20 } else { 230 }])
    })
}

/// Reports the row on listed screenshots only, recording every call.
pub struct ScriptedLocator {
    hits: Vec<PathBuf>,
    y: i32,
    pub calls: RefCell<Vec<(PathBuf, f64)>>,
}

impl ScriptedLocator {
    pub fn new(hits: Vec<PathBuf>, y: i32) -> Self {
        Self {
            hits,
            y,
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn never() -> Self {
        Self::new(Vec::new(), 0)
    }
}

impl RowLocator for ScriptedLocator {
    fn locate_row(&self, screenshot: &Path, threshold: f64) -> RowConsensus {
        self.calls
            .borrow_mut()
            .push((screenshot.to_path_buf(), threshold));
        if self.hits.iter().any(|hit| hit == screenshot) {
            RowConsensus {
                outcome: RowOutcome::Found {
                    y: self.y,
                    method: ConsensusMethod::TwoOfThree,
                    delta_y: Some(0),
                },
                detections: Vec::<TemplateDetection>::new(),
                tolerance_px: 12,
            }
        } else {
            RowConsensus::not_found(ConsensusFailure::NoDetections, Vec::new(), 12)
        }
    }
}
