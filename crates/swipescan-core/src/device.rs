//! Capabilities consumed by the scan engine
//!
//! The device transport, the row detector and the extraction collaborator are
//! all reached through these traits so a scripted double can stand in for any
//! of them.

use crate::Result;
use crate::consensus::RowConsensus;
use std::path::{Path, PathBuf};

/// Produces screenshots as files on disk.
pub trait ScreenshotSource {
    /// Capture the current screen; `label` is a hint for the file name.
    fn capture_screenshot(&mut self, label: &str) -> Result<PathBuf>;
}

/// Fire-and-forget input gestures. A successful return only means the
/// gesture was issued, never that the UI reacted to it.
pub trait GestureSink {
    fn swipe(&mut self, x1: i32, y1: i32, x2: i32, y2: i32, duration_ms: u32) -> Result<()>;
    fn tap(&mut self, x: i32, y: i32) -> Result<()>;
    fn screen_resolution(&mut self) -> Result<(u32, u32)>;
}

/// Anything that can both capture and actuate.
pub trait Device: ScreenshotSource + GestureSink {}

impl<T: ScreenshotSource + GestureSink + ?Sized> Device for T {}

/// Locates the biometrics row on a single screenshot.
///
/// Implementations downgrade I/O faults to a not-found consensus rather
/// than returning an error.
pub trait RowLocator {
    fn locate_row(&self, screenshot: &Path, threshold: f64) -> RowConsensus;
}

/// The extraction collaborator receiving the ordered manifest.
pub trait Extractor {
    fn submit(&mut self, images: &[PathBuf], prompt: &str) -> Result<serde_json::Value>;
}
