//! Windowed frames-per-second estimate

use std::time::Instant;

/// Recomputes FPS once every `window` frames from the wall-clock time the
/// window took. Between windows the last value is kept.
#[derive(Debug, Clone)]
pub struct FpsEstimator {
    window: u32,
    counter: u64,
    window_start: Instant,
    fps: f32,
}

impl FpsEstimator {
    /// Window of 0 is treated as 1
    pub fn new(window: u32) -> Self {
        Self::starting_at(window, Instant::now())
    }

    pub fn starting_at(window: u32, start: Instant) -> Self {
        Self {
            window: window.max(1),
            counter: 0,
            window_start: start,
            fps: 0.0,
        }
    }

    /// Count one processed frame now
    pub fn tick(&mut self) -> f32 {
        self.tick_at(Instant::now())
    }

    /// Count one processed frame at `now`
    pub fn tick_at(&mut self, now: Instant) -> f32 {
        self.counter += 1;

        if self.counter % u64::from(self.window) == 0 {
            let elapsed = now.saturating_duration_since(self.window_start).as_secs_f64();
            if elapsed > 0.0 {
                self.fps = (f64::from(self.window) / elapsed) as f32;
            }
            self.window_start = now;
        }

        self.fps
    }

    /// Last computed estimate, 0 until the first window completes
    pub fn fps(&self) -> f32 {
        self.fps
    }

    pub fn frames(&self) -> u64 {
        self.counter
    }
}
