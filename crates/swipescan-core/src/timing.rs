//! Per-stage timing accumulators

use serde::{Deserialize, Serialize};
use std::time::Instant;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTimings {
    pub capture_ms: u64,
    pub detect_ms: u64,
    pub swipe_ms: u64,
    pub total_ms: u64,
}

impl StageTimings {
    pub fn merge(&mut self, other: &StageTimings) {
        self.capture_ms += other.capture_ms;
        self.detect_ms += other.detect_ms;
        self.swipe_ms += other.swipe_ms;
        self.total_ms += other.total_ms;
    }
}

/// Run `f` and add its wall time to `slot`.
pub fn timed<T>(slot: &mut u64, f: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let out = f();
    *slot += start.elapsed().as_millis() as u64;
    out
}
