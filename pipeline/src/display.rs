use framelab_common::frame::{Frame, FrameError};
use framelab_common::geometry::Point;
use image::{imageops, imageops::FilterType, RgbImage};

/// Destination for composed frames shown to the user.
pub trait DisplaySink {
    fn present(&mut self, frame: &Frame) -> Result<(), DisplayError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DisplayError {
    #[error(transparent)]
    Encode(#[from] FrameError),
    #[error("display surface closed")]
    Closed,
}

/// Placement of a frame inside a display surface, scaled to fit while
/// preserving aspect ratio and centered with letterbox bars.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub frame_width: u32,
    pub frame_height: u32,
    pub surface_width: u32,
    pub surface_height: u32,
    pub scale: f64,
    pub offset_x: u32,
    pub offset_y: u32,
    pub scaled_width: u32,
    pub scaled_height: u32,
}

impl Viewport {
    pub fn fit(frame_width: u32, frame_height: u32, surface_width: u32, surface_height: u32) -> Self {
        let (fw, fh) = (frame_width.max(1), frame_height.max(1));
        let (sw, sh) = (surface_width.max(1), surface_height.max(1));
        let scale = (sw as f64 / fw as f64).min(sh as f64 / fh as f64);
        let scaled_width = ((fw as f64 * scale).round() as u32).clamp(1, sw);
        let scaled_height = ((fh as f64 * scale).round() as u32).clamp(1, sh);
        Self {
            frame_width: fw,
            frame_height: fh,
            surface_width: sw,
            surface_height: sh,
            scale,
            offset_x: (sw - scaled_width) / 2,
            offset_y: (sh - scaled_height) / 2,
            scaled_width,
            scaled_height,
        }
    }

    /// Map a pointer position on the surface into frame coordinates. Points
    /// on the letterbox bars land on the nearest frame edge.
    pub fn surface_to_frame(&self, x: i32, y: i32) -> Point {
        let map = |v: i32, offset: u32, limit: u32| -> i32 {
            let f = ((v as f64 - offset as f64) / self.scale).floor();
            f.clamp(0.0, limit as f64) as i32
        };
        Point::new(
            map(x, self.offset_x, self.frame_width),
            map(y, self.offset_y, self.frame_height),
        )
    }
}

/// Scale `frame` into a `surface_width x surface_height` canvas, letterboxed
/// on black. A zero-sized surface yields the frame unchanged.
pub fn fit_within(frame: &Frame, surface_width: u32, surface_height: u32) -> Frame {
    let (fw, fh) = frame.dimensions();
    if surface_width == 0 || surface_height == 0 || fw == 0 || fh == 0 {
        return frame.clone();
    }
    if (fw, fh) == (surface_width, surface_height) {
        return frame.clone();
    }
    let viewport = Viewport::fit(fw, fh, surface_width, surface_height);
    let scaled = imageops::resize(
        frame.image(),
        viewport.scaled_width,
        viewport.scaled_height,
        FilterType::Triangle,
    );
    let mut canvas = RgbImage::new(surface_width, surface_height);
    imageops::replace(
        &mut canvas,
        &scaled,
        viewport.offset_x as i64,
        viewport.offset_y as i64,
    );
    Frame::new(canvas, frame.captured_at_ms, frame.seq)
}
