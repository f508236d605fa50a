use std::time::Instant;

/// Counts composed frames and reports the rate once per sampling period.
#[derive(Debug, Clone)]
pub struct FrameRateMeter {
    since_sample: u64,
    total: u64,
    last_sample_at: Instant,
    last_fps: f64,
}

impl FrameRateMeter {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(start: Instant) -> Self {
        Self {
            since_sample: 0,
            total: 0,
            last_sample_at: start,
            last_fps: 0.0,
        }
    }

    pub fn record_frame(&mut self) {
        self.since_sample += 1;
        self.total += 1;
    }

    /// Frames counted since the previous sample; resets the counter.
    pub fn sample(&mut self) -> u64 {
        self.sample_at(Instant::now())
    }

    pub fn sample_at(&mut self, now: Instant) -> u64 {
        let frames = std::mem::take(&mut self.since_sample);
        let elapsed = now.saturating_duration_since(self.last_sample_at).as_secs_f64();
        self.last_fps = if elapsed > 0.0 {
            frames as f64 / elapsed
        } else {
            frames as f64
        };
        self.last_sample_at = now;
        frames
    }

    /// Frames per second measured over the most recent sampling period.
    pub fn last_fps(&self) -> f64 {
        self.last_fps
    }

    pub fn total_frames(&self) -> u64 {
        self.total
    }
}

impl Default for FrameRateMeter {
    fn default() -> Self {
        Self::new()
    }
}
