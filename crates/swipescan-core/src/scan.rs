//! Bounded stabilizing scan
//!
//! The one loop behind the carousel sweep, the horizontal stitcher and the
//! vertical page collector: advance, capture, compare against the last kept
//! frame, and stop on whichever comes first of a stable run of duplicates or
//! the step budget. Both ceilings always apply.

use crate::Result;
use crate::device::ScreenshotSource;
use crate::hash::{self, BandSpec};
use crate::timing::{StageTimings, timed};
use image::DynamicImage;
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// The two independent termination ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanLimits {
    /// Hard cap on gestures issued.
    pub max_steps: usize,
    /// Consecutive duplicates that count as "content stopped changing".
    pub stable_repeats: usize,
}

/// How two frames are judged equal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimilarityRule {
    FullFrame {
        hash_size: u32,
        threshold: u32,
    },
    /// Only the band centred on `y_center` is compared.
    Band {
        y_center: i64,
        band: BandSpec,
        hash_size: u32,
        threshold: u32,
    },
}

impl SimilarityRule {
    pub fn is_similar(&self, first: &DynamicImage, second: &DynamicImage) -> bool {
        match *self {
            SimilarityRule::FullFrame {
                hash_size,
                threshold,
            } => hash::similar(
                &hash::ahash(first, hash_size),
                &hash::ahash(second, hash_size),
                threshold,
            ),
            SimilarityRule::Band {
                y_center,
                band,
                hash_size,
                threshold,
            } => hash::similar_in_roi(first, second, y_center, band, hash_size, threshold),
        }
    }
}

/// Gesture distance, as a fraction of the screen dimension.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StridePolicy {
    Fixed(f32),
    /// `micro` while content keeps changing, `seek` right after a duplicate.
    Adaptive { micro: f32, seek: f32 },
}

impl StridePolicy {
    pub fn stride(&self, stable_count: usize) -> f32 {
        match *self {
            StridePolicy::Fixed(distance) => distance,
            StridePolicy::Adaptive { micro, seek } => {
                if stable_count > 0 {
                    seek
                } else {
                    micro
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    Kept,
    Duplicate,
}

/// Last-kept reference plus the stability counter for one scan.
pub struct FrameBuffer {
    rule: SimilarityRule,
    kept: Vec<PathBuf>,
    last_image: Option<DynamicImage>,
    stable_count: usize,
}

impl FrameBuffer {
    pub fn new(rule: SimilarityRule) -> Self {
        Self {
            rule,
            kept: Vec::new(),
            last_image: None,
            stable_count: 0,
        }
    }

    /// Compare `frame` with the last kept frame. An unreadable frame never
    /// matches, so it is kept rather than mistaken for stability.
    pub fn observe(&mut self, frame: &Path) -> Observation {
        let image = hash::load_frame(frame);
        let duplicate = match (&self.last_image, &image) {
            (Some(last), Some(current)) => self.rule.is_similar(last, current),
            _ => false,
        };

        if duplicate && !self.kept.is_empty() {
            self.stable_count += 1;
            Observation::Duplicate
        } else {
            self.keep(frame.to_path_buf(), image);
            Observation::Kept
        }
    }

    /// Keep `frame` unconditionally.
    pub fn seed(&mut self, frame: &Path) {
        let image = hash::load_frame(frame);
        self.keep(frame.to_path_buf(), image);
    }

    fn keep(&mut self, frame: PathBuf, image: Option<DynamicImage>) {
        self.kept.push(frame);
        self.last_image = image;
        self.stable_count = 0;
    }

    pub fn stable_count(&self) -> usize {
        self.stable_count
    }

    pub fn kept_frames(&self) -> &[PathBuf] {
        &self.kept
    }

    pub fn into_kept(self) -> Vec<PathBuf> {
        self.kept
    }
}

/// Returned by the per-kept-frame hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Halt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The hook asked to stop.
    Halted,
    /// `stable_repeats` consecutive duplicates.
    Stable,
    /// `max_steps` gestures issued.
    StepBudget,
}

#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub kept_frames: Vec<PathBuf>,
    pub stop: StopReason,
    /// Gestures issued.
    pub steps: usize,
    pub timings: StageTimings,
}

pub struct ScanLoop {
    label: String,
    rule: SimilarityRule,
    stride: StridePolicy,
    limits: ScanLimits,
}

impl ScanLoop {
    pub fn new(label: &str, rule: SimilarityRule, stride: StridePolicy, limits: ScanLimits) -> Self {
        Self {
            label: label.to_string(),
            rule,
            stride,
            limits,
        }
    }

    pub fn limits(&self) -> ScanLimits {
        self.limits
    }

    /// Run the scan.
    ///
    /// `start` is kept without comparison; when absent it is captured first.
    /// `advance` issues exactly one gesture of the given stride. `on_kept` sees
    /// every kept frame, the start frame included, and may halt the scan.
    pub fn run<D, A, K>(
        &self,
        device: &mut D,
        start: Option<PathBuf>,
        mut advance: A,
        mut on_kept: K,
    ) -> Result<ScanOutcome>
    where
        D: ScreenshotSource + ?Sized,
        A: FnMut(&mut D, f32) -> Result<()>,
        K: FnMut(&Path) -> Result<Flow>,
    {
        let started = Instant::now();
        let mut timings = StageTimings::default();
        let mut buffer = FrameBuffer::new(self.rule);

        let start = match start {
            Some(path) => path,
            None => timed(&mut timings.capture_ms, || {
                device.capture_screenshot(&format!("{}_0", self.label))
            })?,
        };
        buffer.seed(&start);

        let mut steps = 0;
        let mut stop = StopReason::StepBudget;
        if on_kept(&start)? == Flow::Halt {
            stop = StopReason::Halted;
        } else {
            while steps < self.limits.max_steps {
                let stride = self.stride.stride(buffer.stable_count());
                timed(&mut timings.swipe_ms, || advance(device, stride))?;
                steps += 1;

                let label = format!("{}_{}", self.label, steps);
                let frame = timed(&mut timings.capture_ms, || device.capture_screenshot(&label))?;

                match buffer.observe(&frame) {
                    Observation::Kept => {
                        debug!("{}: step {} kept {:?}", self.label, steps, frame);
                        if on_kept(&frame)? == Flow::Halt {
                            stop = StopReason::Halted;
                            break;
                        }
                    }
                    Observation::Duplicate => {
                        debug!(
                            "{}: step {} duplicate ({}/{})",
                            self.label,
                            steps,
                            buffer.stable_count(),
                            self.limits.stable_repeats
                        );
                        if buffer.stable_count() >= self.limits.stable_repeats {
                            stop = StopReason::Stable;
                            break;
                        }
                    }
                }
            }
        }

        timings.total_ms = started.elapsed().as_millis() as u64;
        info!(
            "{}: {} frame(s) kept after {} step(s), stopped: {:?}",
            self.label,
            buffer.kept_frames().len(),
            steps,
            stop
        );
        Ok(ScanOutcome {
            kept_frames: buffer.into_kept(),
            stop,
            steps,
            timings,
        })
    }
}
