use chrono::Utc;
use framelab_common::frame::Frame;
use image::{Rgb, RgbImage};
use tokio::sync::watch;

use crate::source::{FrameSlot, FrameSource};

const BARS: [[u8; 3]; 8] = [
    [192, 192, 192],
    [192, 192, 0],
    [0, 192, 192],
    [0, 192, 0],
    [192, 0, 192],
    [192, 0, 0],
    [0, 0, 192],
    [16, 16, 16],
];

/// Synthetic camera: color bars with a white square sweeping left to right.
/// Every read produces a new frame, and frame `n` is always the same image.
pub struct PatternSource {
    tx: watch::Sender<Option<Frame>>,
    slot: FrameSlot,
    width: u32,
    height: u32,
    fps: f64,
    seq: u64,
    closed: bool,
}

impl PatternSource {
    pub fn new(width: u32, height: u32, fps: f64) -> Self {
        let (tx, slot) = FrameSlot::channel();
        tx.send_replace(Some(render(width, height, 0)));
        Self {
            tx,
            slot,
            width,
            height,
            fps,
            seq: 0,
            closed: false,
        }
    }
}

/// Frame `seq` of the pattern.
pub fn render(width: u32, height: u32, seq: u64) -> Frame {
    let bar_width = (width / BARS.len() as u32).max(1);
    let mut image = RgbImage::from_fn(width, height, |x, _| {
        let i = ((x / bar_width) as usize).min(BARS.len() - 1);
        Rgb(BARS[i])
    });

    let side = (height / 4).max(1).min(width);
    let travel = u64::from(width.saturating_sub(side)) + 1;
    let left = (seq * 4 % travel) as u32;
    let top = height.saturating_sub(side) / 2;
    for y in top..(top + side).min(height) {
        for x in left..(left + side).min(width) {
            image.put_pixel(x, y, Rgb([255, 255, 255]));
        }
    }
    Frame::new(image, Utc::now().timestamp_millis(), seq)
}

impl FrameSource for PatternSource {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn nominal_fps(&self) -> f64 {
        self.fps
    }

    fn read_frame(&mut self) -> Option<Frame> {
        if self.closed {
            return None;
        }
        self.seq += 1;
        self.tx
            .send_replace(Some(render(self.width, self.height, self.seq)));
        self.slot.take_new()
    }

    fn latest_frame(&self) -> Option<Frame> {
        self.slot.latest()
    }

    fn subscribe(&self) -> watch::Receiver<Option<Frame>> {
        self.slot.subscribe()
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_have_requested_size_and_advance() {
        let mut source = PatternSource::new(64, 48, 30.0);
        let a = source.read_frame().unwrap();
        let b = source.read_frame().unwrap();
        assert_eq!(a.dimensions(), (64, 48));
        assert_eq!(b.seq, a.seq + 1);
        assert_ne!(a.image(), b.image());
    }

    #[test]
    fn render_is_deterministic() {
        assert_eq!(render(40, 30, 7).image(), render(40, 30, 7).image());
    }

    #[test]
    fn square_is_white_and_bars_are_not() {
        let frame = render(80, 40, 0);
        assert_eq!(frame.image().get_pixel(2, 20).0, [255, 255, 255]);
        assert_eq!(frame.image().get_pixel(79, 0).0, [16, 16, 16]);
    }

    #[test]
    fn closed_source_stops_producing() {
        let mut source = PatternSource::new(8, 8, 30.0);
        source.close();
        assert!(source.read_frame().is_none());
        assert!(source.latest_frame().is_some());
    }

    #[test]
    fn degenerate_sizes_do_not_panic() {
        for (w, h) in [(1, 1), (1, 50), (50, 1)] {
            assert_eq!(render(w, h, 3).dimensions(), (w, h));
        }
    }
}
