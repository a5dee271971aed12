//! Vertical page collector

use crate::Result;
use crate::config::{PageConfig, ScrollConfig};
use crate::device::Device;
use crate::scan::{Flow, ScanLimits, ScanLoop, SimilarityRule, StopReason, StridePolicy};
use crate::scroll::{ScrollController, VerticalDirection};
use crate::timing::StageTimings;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct PageCollection {
    /// Unique pages in scroll order, the starting frame first.
    pub pages: Vec<PathBuf>,
    pub stop: StopReason,
    pub timings: StageTimings,
}

/// Pages down with whole-frame dedup: every scroll re-renders the full screen.
pub struct PageCollector<'a> {
    config: &'a PageConfig,
    page_distance: f32,
}

impl<'a> PageCollector<'a> {
    pub fn new(config: &'a PageConfig, scroll: &ScrollConfig) -> Self {
        Self {
            config,
            page_distance: scroll.page_distance,
        }
    }

    pub fn run<D: Device + ?Sized>(
        &self,
        device: &mut D,
        scroller: &ScrollController,
        start: Option<PathBuf>,
    ) -> Result<PageCollection> {
        let scan = ScanLoop::new(
            "page",
            SimilarityRule::FullFrame {
                hash_size: self.config.hash_size,
                threshold: self.config.hamming_threshold,
            },
            StridePolicy::Fixed(self.page_distance),
            ScanLimits {
                max_steps: self.config.max_vertical_pages,
                stable_repeats: self.config.stable_repeats,
            },
        );
        let outcome = scan.run(
            device,
            start,
            |d: &mut D, stride| {
                scroller
                    .scroll_vertical(d, VerticalDirection::Down, stride)
                    .map(|_| ())
            },
            |_| Ok(Flow::Continue),
        )?;

        Ok(PageCollection {
            pages: outcome.kept_frames,
            stop: outcome.stop,
            timings: outcome.timings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanConfig;
    use crate::replay::ReplayDevice;
    use crate::test_utils::stripe_frames;

    #[test]
    fn test_page_cap_bounds_scrolls() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let frames = stripe_frames(dir.path(), &[0, 1, 2, 3, 4, 5, 6, 7, 0, 1], 64, 64)?;
        let mut config = ScanConfig::without_delays();
        config.pages.max_vertical_pages = 3;
        let scroller = ScrollController::new(config.scroll.clone(), (64, 64));
        let mut device = ReplayDevice::new(frames.clone(), (64, 64))?;

        let collection = PageCollector::new(&config.pages, &config.scroll).run(&mut device, &scroller, None)?;
        assert_eq!(collection.pages, frames[..4].to_vec());
        assert_eq!(collection.stop, StopReason::StepBudget);
        assert_eq!(device.swipes().len(), 3);
        assert!(device.swipes().iter().all(|s| s.y1 > s.y2));
        Ok(())
    }

    #[test]
    fn test_pages_settle_after_repeats() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let frames = stripe_frames(dir.path(), &[0, 1, 2, 2, 2], 64, 64)?;
        let config = ScanConfig::without_delays();
        let scroller = ScrollController::new(config.scroll.clone(), (64, 64));
        let mut device = ReplayDevice::new(frames.clone(), (64, 64))?;

        let collection = PageCollector::new(&config.pages, &config.scroll).run(&mut device, &scroller, None)?;
        assert_eq!(collection.pages, frames[..3].to_vec());
        assert_eq!(collection.stop, StopReason::Stable);
        assert_eq!(device.swipes().len(), 4);
        Ok(())
    }
}
