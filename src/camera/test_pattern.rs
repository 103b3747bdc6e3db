//! Synthetic frame source for running without a camera

use std::thread;
use std::time::{Duration, Instant};

use super::{Camera, CameraError, PixelFormat, RawFrame};

/// Moving colour bars paced at a fixed frame rate, BGR like a webcam
pub struct TestPatternCamera {
    width: u32,
    height: u32,
    interval: Duration,
    frame_limit: Option<u64>,
    produced: u64,
    next_due: Option<Instant>,
}

impl TestPatternCamera {
    /// `fps` of 0 disables pacing
    pub fn new(width: u32, height: u32, fps: u32, frame_limit: Option<u64>) -> Self {
        let interval = if fps == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(1) / fps
        };

        Self {
            width,
            height,
            interval,
            frame_limit,
            produced: 0,
            next_due: None,
        }
    }

    fn render(&self) -> Vec<u8> {
        const BARS: [[u8; 3]; 7] = [
            [255, 255, 255],
            [0, 255, 255],
            [255, 255, 0],
            [0, 255, 0],
            [255, 0, 255],
            [0, 0, 255],
            [255, 0, 0],
        ];

        let width = self.width.max(1) as usize;
        let shift = (self.produced as usize * 4) % width;
        let mut data = Vec::with_capacity(PixelFormat::Bgr8.frame_size(self.width, self.height));

        for _ in 0..self.height {
            for x in 0..self.width as usize {
                let bar = ((x + shift) % width) * BARS.len() / width;
                data.extend_from_slice(&BARS[bar]);
            }
        }
        data
    }

    fn pace(&mut self) {
        if self.interval.is_zero() {
            return;
        }

        let now = Instant::now();
        let due = self.next_due.unwrap_or(now);
        if due > now {
            thread::sleep(due - now);
        }
        self.next_due = Some(due.max(now) + self.interval);
    }
}

impl Camera for TestPatternCamera {
    fn capture(&mut self) -> Result<Option<RawFrame>, CameraError> {
        if self.frame_limit.is_some_and(|limit| self.produced >= limit) {
            return Ok(None);
        }

        self.pace();
        let frame = RawFrame::new(self.render(), self.width, self.height, PixelFormat::Bgr8);
        self.produced += 1;

        Ok(Some(frame))
    }

    fn describe(&self) -> String {
        format!("test pattern {}x{}", self.width, self.height)
    }
}
