//! Scripted device double
//!
//! Replays a fixed sequence of screenshots, one per capture, and records every
//! gesture it receives. Once the script runs out the last frame repeats, the
//! way a fully scrolled screen stops changing.

use crate::Result;
use crate::device::{GestureSink, ScreenshotSource};
use crate::scroll::Swipe;
use anyhow::{Context, bail};
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

const FRAME_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

#[derive(Debug, Clone)]
pub struct ReplayDevice {
    frames: Vec<PathBuf>,
    cursor: usize,
    resolution: (u32, u32),
    captures: Vec<String>,
    swipes: Vec<Swipe>,
    taps: Vec<(i32, i32)>,
}

impl ReplayDevice {
    pub fn new(frames: Vec<PathBuf>, resolution: (u32, u32)) -> Result<Self> {
        if frames.is_empty() {
            bail!("replay script is empty");
        }
        Ok(Self {
            frames,
            cursor: 0,
            resolution,
            captures: Vec::new(),
            swipes: Vec::new(),
            taps: Vec::new(),
        })
    }

    /// Replay every image in `dir`, sorted by file name. The resolution is
    /// taken from the first frame.
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let mut frames: Vec<PathBuf> = fs::read_dir(dir)
            .with_context(|| format!("Failed to read replay directory {:?}", dir))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| FRAME_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
            })
            .collect();
        frames.sort();

        let first = frames
            .first()
            .with_context(|| format!("No frames found in {:?}", dir))?;
        let resolution = image::image_dimensions(first)
            .with_context(|| format!("Failed to read dimensions of {:?}", first))?;
        Self::new(frames, resolution)
    }

    pub fn frames(&self) -> &[PathBuf] {
        &self.frames
    }

    /// Labels passed to every capture so far.
    pub fn captures(&self) -> &[String] {
        &self.captures
    }

    pub fn swipes(&self) -> &[Swipe] {
        &self.swipes
    }

    pub fn taps(&self) -> &[(i32, i32)] {
        &self.taps
    }

    /// Whether every scripted frame has been handed out at least once.
    pub fn exhausted(&self) -> bool {
        self.cursor >= self.frames.len()
    }
}

impl ScreenshotSource for ReplayDevice {
    fn capture_screenshot(&mut self, label: &str) -> Result<PathBuf> {
        let index = self.cursor.min(self.frames.len() - 1);
        self.cursor += 1;
        self.captures.push(label.to_string());
        debug!("replay capture {} -> {:?}", label, self.frames[index]);
        Ok(self.frames[index].clone())
    }
}

impl GestureSink for ReplayDevice {
    fn swipe(&mut self, x1: i32, y1: i32, x2: i32, y2: i32, duration_ms: u32) -> Result<()> {
        self.swipes.push(Swipe {
            x1,
            y1,
            x2,
            y2,
            duration_ms,
        });
        Ok(())
    }

    fn tap(&mut self, x: i32, y: i32) -> Result<()> {
        self.taps.push((x, y));
        Ok(())
    }

    fn screen_resolution(&mut self) -> Result<(u32, u32)> {
        Ok(self.resolution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeats_last_frame() -> Result<()> {
        let frames = vec![PathBuf::from("a.png"), PathBuf::from("b.png")];
        let mut device = ReplayDevice::new(frames, (100, 200))?;

        assert_eq!(device.capture_screenshot("x")?, PathBuf::from("a.png"));
        assert_eq!(device.capture_screenshot("x")?, PathBuf::from("b.png"));
        assert!(device.exhausted());
        assert_eq!(device.capture_screenshot("x")?, PathBuf::from("b.png"));
        assert_eq!(device.captures().len(), 3);

        device.swipe(1, 2, 3, 4, 500)?;
        device.tap(5, 6)?;
        assert_eq!(device.swipes().len(), 1);
        assert_eq!(device.taps(), &[(5, 6)]);
        assert_eq!(device.screen_resolution()?, (100, 200));
        Ok(())
    }

    #[test]
    fn test_empty_script_is_rejected() {
        assert!(ReplayDevice::new(Vec::new(), (1, 1)).is_err());
    }

    #[test]
    fn test_from_dir_sorts_frames() -> Result<()> {
        let dir = tempfile::tempdir()?;
        for name in ["02.png", "01.png", "notes.txt"] {
            let path = dir.path().join(name);
            if name.ends_with(".png") {
                image::GrayImage::new(8, 16).save(&path)?;
            } else {
                fs::write(&path, "skip")?;
            }
        }

        let device = ReplayDevice::from_dir(dir.path())?;
        assert_eq!(device.frames().len(), 2);
        assert!(device.frames()[0].ends_with("01.png"));
        assert_eq!(device.resolution, (8, 16));
        Ok(())
    }
}
