//! Swipe actuation
//!
//! Pure actuation: the controller issues one gesture, blocks for the settle
//! delay and reports the geometry it used. Whether content actually moved is
//! decided later by the caller comparing screenshots.

use crate::Result;
use crate::config::ScrollConfig;
use crate::device::GestureSink;
use log::debug;
use rand::Rng;
use std::thread;
use std::time::Duration;

/// Direction of travel through the profile, not of the finger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerticalDirection {
    /// Reveal content further down; the finger moves up.
    Down,
    Up,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HorizontalDirection {
    /// Reveal the next carousel item; the finger moves left.
    Forward,
    Back,
}

/// Geometry of an issued gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Swipe {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
    pub duration_ms: u32,
}

pub struct ScrollController {
    config: ScrollConfig,
    width: u32,
    height: u32,
}

impl ScrollController {
    pub fn new(config: ScrollConfig, screen: (u32, u32)) -> Self {
        Self {
            config,
            width: screen.0,
            height: screen.1,
        }
    }

    pub fn screen(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn config(&self) -> &ScrollConfig {
        &self.config
    }

    /// Plan a vertical swipe covering `distance_fraction` of the screen height.
    ///
    /// Both endpoints are clamped between the top and bottom guards so the
    /// finger never lands on the fixed control at the bottom of the screen.
    pub fn plan_vertical(&self, direction: VerticalDirection, distance_fraction: f32, jitter: i32) -> Swipe {
        let h = self.height as f32;
        let top = (h * self.config.top_guard).round() as i32;
        let bottom = ((h * self.config.bottom_guard).round() as i32).max(top + 1);
        let centre = (top + bottom) / 2;
        let half = ((h * distance_fraction.clamp(0.0, 1.0)) / 2.0).round() as i32;

        let low = (centre + half).clamp(top, bottom);
        let high = (centre - half).clamp(top, bottom);
        let (y1, y2) = match direction {
            VerticalDirection::Down => (low, high),
            VerticalDirection::Up => (high, low),
        };

        let x = self.width as i32 / 2;
        Swipe {
            x1: x,
            y1,
            x2: (x + jitter).clamp(0, self.width as i32 - 1),
            y2,
            duration_ms: self.config.vertical_duration_ms,
        }
    }

    /// Plan a horizontal swipe along the row `y`, inside the gesture-safe corridor.
    pub fn plan_horizontal(&self, direction: HorizontalDirection, distance_fraction: f32, y: i32, centre_x: i32) -> Swipe {
        let w = self.width as f32;
        let left = (w * self.config.horizontal_margin).round() as i32;
        let right = ((w * (1.0 - self.config.horizontal_margin)).round() as i32).max(left + 1);
        let dx = (w * distance_fraction.clamp(0.0, 1.0) / 2.0).round() as i32;

        let (x1, x2) = match direction {
            HorizontalDirection::Forward => (centre_x + dx, centre_x - dx),
            HorizontalDirection::Back => (centre_x - dx, centre_x + dx),
        };
        Swipe {
            x1: x1.clamp(left, right),
            y1: y,
            x2: x2.clamp(left, right),
            y2: y,
            duration_ms: self.config.horizontal_duration_ms.max(350),
        }
    }

    fn jitter(&self) -> i32 {
        let max = self.config.x_jitter_px.abs();
        if max == 0 {
            return 0;
        }
        let magnitude = rand::thread_rng().gen_range(1..=max);
        if rand::thread_rng().gen_bool(0.5) { magnitude } else { -magnitude }
    }

    fn settle(&self, millis: u64) {
        if millis > 0 {
            thread::sleep(Duration::from_millis(millis));
        }
    }

    pub fn scroll_vertical<G: GestureSink + ?Sized>(
        &self,
        device: &mut G,
        direction: VerticalDirection,
        distance_fraction: f32,
    ) -> Result<Swipe> {
        let swipe = self.plan_vertical(direction, distance_fraction, self.jitter());
        debug!("vertical swipe {:?} {:?}", direction, swipe);
        device.swipe(swipe.x1, swipe.y1, swipe.x2, swipe.y2, swipe.duration_ms)?;
        self.settle(self.config.vertical_settle_ms);
        Ok(swipe)
    }

    pub fn scroll_horizontal<G: GestureSink + ?Sized>(
        &self,
        device: &mut G,
        direction: HorizontalDirection,
        distance_fraction: f32,
        y: i32,
        centre_x: i32,
    ) -> Result<Swipe> {
        let swipe = self.plan_horizontal(direction, distance_fraction, y, centre_x);
        debug!("horizontal swipe {:?} {:?}", direction, swipe);
        device.swipe(swipe.x1, swipe.y1, swipe.x2, swipe.y2, swipe.duration_ms)?;
        self.settle(self.config.horizontal_settle_ms);
        Ok(swipe)
    }
}
