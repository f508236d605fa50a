//! Per-tick frame composition: mirror, transform (whole frame or region of
//! interest), then overlays.

use framelab_common::config::PipelineConfig;
use framelab_common::frame::Frame;
use framelab_common::geometry::Rect;
use framelab_common::state::InteractionState;
use image::{imageops, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect as DrawRect;
use tracing::trace;

use crate::filter::Transform;

/// Width in pixels of ROI and selection outlines.
pub const OUTLINE_THICKNESS: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositorStyle {
    pub edge_color: Rgb<u8>,
    pub roi_color: Rgb<u8>,
    pub selection_color: Rgb<u8>,
}

impl Default for CompositorStyle {
    fn default() -> Self {
        Self {
            edge_color: Rgb([255, 255, 255]),
            roi_color: Rgb([0, 255, 0]),
            selection_color: Rgb([0, 0, 255]),
        }
    }
}

impl From<&PipelineConfig> for CompositorStyle {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            edge_color: Rgb(config.edge_color),
            roi_color: Rgb(config.roi_color),
            selection_color: Rgb(config.selection_color),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Compositor {
    style: CompositorStyle,
}

impl Compositor {
    pub fn new(style: CompositorStyle) -> Self {
        Self { style }
    }

    /// Produce the displayed frame from a raw camera frame.
    ///
    /// The raw buffer is mirrored and transformed in place and returned as
    /// the output; capture metadata is carried over unchanged.
    pub fn compose(&self, raw: Frame, state: &InteractionState) -> Frame {
        let transform = Transform::select(state, self.style.edge_color);
        let mut frame = raw;
        imageops::flip_horizontal_in_place(frame.image_mut());
        let (width, height) = frame.dimensions();

        match state.roi() {
            None => {
                if !transform.is_identity() {
                    frame = frame.map_image(|image| transform.apply(image));
                }
            }
            Some(roi) => {
                let rect = roi.clamp_to(width, height);
                if !rect.is_empty() && !transform.is_identity() {
                    let region = imageops::crop_imm(
                        frame.image(),
                        rect.x1 as u32,
                        rect.y1 as u32,
                        rect.width(),
                        rect.height(),
                    )
                    .to_image();
                    let processed = transform.apply(region);
                    imageops::replace(frame.image_mut(), &processed, rect.x1 as i64, rect.y1 as i64);
                }
                draw_outline(frame.image_mut(), rect, self.style.roi_color);
            }
        }

        if let Some(selection) = state.live_selection() {
            draw_outline(frame.image_mut(), selection, self.style.selection_color);
        }

        trace!(seq = frame.seq, transform = transform.name(), "composed frame");
        frame
    }
}

/// Draw a 2-pixel outline straddling `rect`'s boundary: the rectangle's own
/// outermost ring plus the ring just outside it. Parts off the image are clipped.
pub fn draw_outline(image: &mut RgbImage, rect: Rect, color: Rgb<u8>) {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return;
    }
    // Keep far off-screen pointer positions from producing huge line segments.
    let limit_x = w.min(i32::MAX as u32 - 4) as i32 + OUTLINE_THICKNESS;
    let limit_y = h.min(i32::MAX as u32 - 4) as i32 + OUTLINE_THICKNESS;
    let x1 = rect.x1.clamp(-OUTLINE_THICKNESS, limit_x);
    let y1 = rect.y1.clamp(-OUTLINE_THICKNESS, limit_y);
    let x2 = rect.x2.clamp(-OUTLINE_THICKNESS, limit_x).max(x1);
    let y2 = rect.y2.clamp(-OUTLINE_THICKNESS, limit_y).max(y1);
    let (rw, rh) = ((x2 - x1) as u32, (y2 - y1) as u32);

    let outer = DrawRect::at(x1 - 1, y1 - 1).of_size(rw + 2, rh + 2);
    draw_hollow_rect_mut(image, outer, color);
    if rw > 0 && rh > 0 {
        draw_hollow_rect_mut(image, DrawRect::at(x1, y1).of_size(rw, rh), color);
    }
}
