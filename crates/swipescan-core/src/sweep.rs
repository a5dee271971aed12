//! Carousel sweep
//!
//! Pages down the profile until the row detector agrees on the biometrics
//! row. The page budget and the stability run bound the sweep independently.

use crate::Result;
use crate::config::{ScrollConfig, SweepConfig};
use crate::consensus::{ConsensusMethod, RowConsensus};
use crate::device::{Device, RowLocator};
use crate::error::ScanError;
use crate::scan::{Flow, ScanLimits, ScanLoop, SimilarityRule, StopReason, StridePolicy};
use crate::scroll::{ScrollController, VerticalDirection};
use crate::timing::{StageTimings, timed};
use log::{debug, info};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Why a sweep ended without a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepEnd {
    ExhaustedPages,
    /// Consecutive pages stopped changing; most likely the end of the feed.
    Stalled,
}

impl fmt::Display for SweepEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepEnd::ExhaustedPages => write!(f, "page budget exhausted"),
            SweepEnd::Stalled => write!(f, "content stopped changing"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum SweepOutcome {
    Found {
        y: i32,
        pages_scanned: usize,
        image_used: PathBuf,
        method: ConsensusMethod,
    },
    NotFound {
        pages_scanned: usize,
        end: SweepEnd,
    },
}

impl SweepOutcome {
    pub fn found(&self) -> bool {
        matches!(self, SweepOutcome::Found { .. })
    }

    pub fn pages_scanned(&self) -> usize {
        match self {
            SweepOutcome::Found { pages_scanned, .. } | SweepOutcome::NotFound { pages_scanned, .. } => {
                *pages_scanned
            }
        }
    }

    /// `(y, image_used)`, or the profile-fatal error.
    pub fn into_row(self) -> std::result::Result<(i32, PathBuf), ScanError> {
        match self {
            SweepOutcome::Found { y, image_used, .. } => Ok((y, image_used)),
            SweepOutcome::NotFound { pages_scanned, end } => {
                Err(ScanError::RowNotFound { pages_scanned, end })
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SweepReport {
    pub outcome: SweepOutcome,
    pub timings: StageTimings,
}

pub struct CarouselSweep<'a> {
    config: &'a SweepConfig,
    page_distance: f32,
}

impl<'a> CarouselSweep<'a> {
    pub fn new(config: &'a SweepConfig, scroll: &ScrollConfig) -> Self {
        Self {
            config,
            page_distance: scroll.page_distance,
        }
    }

    /// Detection on one page, with the single lower-threshold retry.
    fn detect<L: RowLocator + ?Sized>(&self, locator: &L, frame: &Path) -> RowConsensus {
        let first = locator.locate_row(frame, self.config.threshold);
        if first.found() {
            return first;
        }
        match self.config.retry_threshold {
            Some(retry) if retry < self.config.threshold => {
                debug!("retrying {:?} at threshold {:.2}", frame, retry);
                locator.locate_row(frame, retry)
            }
            _ => first,
        }
    }

    /// Sweep from `start` (or a fresh capture), scrolling down one page
    /// between detections. Duplicate frames are never re-detected.
    pub fn run<D, L>(
        &self,
        device: &mut D,
        locator: &L,
        scroller: &ScrollController,
        start: Option<PathBuf>,
    ) -> Result<SweepReport>
    where
        D: Device + ?Sized,
        L: RowLocator + ?Sized,
    {
        let scan = ScanLoop::new(
            "sweep",
            SimilarityRule::FullFrame {
                hash_size: self.config.hash_size,
                threshold: self.config.hamming_threshold,
            },
            StridePolicy::Fixed(self.page_distance),
            ScanLimits {
                max_steps: self.config.max_sweep_pages.saturating_sub(1),
                stable_repeats: self.config.stable_repeats,
            },
        );

        let mut detect_ms = 0;
        let mut pages = 0;
        let mut hit: Option<(RowConsensus, PathBuf)> = None;
        let outcome = scan.run(
            device,
            start,
            |d: &mut D, stride| {
                scroller
                    .scroll_vertical(d, VerticalDirection::Down, stride)
                    .map(|_| ())
            },
            |frame| {
                pages += 1;
                let consensus = timed(&mut detect_ms, || self.detect(locator, frame));
                if consensus.found() {
                    hit = Some((consensus, frame.to_path_buf()));
                    Ok(Flow::Halt)
                } else {
                    debug!("page {}: no row ({:?})", pages, consensus.failure());
                    Ok(Flow::Continue)
                }
            },
        )?;

        let mut timings = outcome.timings;
        timings.detect_ms = detect_ms;

        let result = match (hit, outcome.stop) {
            (Some((consensus, image_used)), _) => match (consensus.y(), consensus.method()) {
                (Some(y), Some(method)) => SweepOutcome::Found {
                    y,
                    pages_scanned: pages,
                    image_used,
                    method,
                },
                _ => SweepOutcome::NotFound {
                    pages_scanned: pages,
                    end: SweepEnd::ExhaustedPages,
                },
            },
            (None, StopReason::Stable) => SweepOutcome::NotFound {
                pages_scanned: pages,
                end: SweepEnd::Stalled,
            },
            (None, _) => SweepOutcome::NotFound {
                pages_scanned: pages,
                end: SweepEnd::ExhaustedPages,
            },
        };

        info!(
            "Sweep: {:?} (capture {} ms, detect {} ms, swipe {} ms)",
            result, timings.capture_ms, timings.detect_ms, timings.swipe_ms
        );
        Ok(SweepReport {
            outcome: result,
            timings,
        })
    }
}
