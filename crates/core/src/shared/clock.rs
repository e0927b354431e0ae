use std::time::{Duration, Instant};

use crate::shared::frame::Frame;

/// Supplies the stream timestamp for each frame.
///
/// All session timing (grace window, poll spacing, capture spacing) is
/// measured against these timestamps, so tests and file replays can be
/// fully deterministic.
pub trait Clock: Send {
    fn now(&mut self, frame: &Frame) -> Duration;
}

/// Wall-clock time since the first frame, for live sources.
pub struct MonotonicClock {
    start: Option<Instant>,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { start: None }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&mut self, _frame: &Frame) -> Duration {
        let start = *self.start.get_or_insert_with(Instant::now);
        start.elapsed()
    }
}

/// Presentation time derived from the frame index and a nominal rate.
pub struct FrameClock {
    fps: f64,
}

impl FrameClock {
    pub fn new(fps: f64) -> Result<Self, &'static str> {
        if !(fps.is_finite() && fps > 0.0) {
            return Err("fps must be positive");
        }
        Ok(Self { fps })
    }
}

impl Clock for FrameClock {
    fn now(&mut self, frame: &Frame) -> Duration {
        Duration::from_secs_f64(frame.index() as f64 / self.fps)
    }
}
