use serde::{Deserialize, Serialize};

/// A position in frame pixel coordinates. May lie outside the frame while a
/// pointer is being dragged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle covering the half-open pixel region
/// `[x1, x2) x [y1, y2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Rect {
    /// Rectangle spanned by two arbitrary corners, normalized so that
    /// `x1 <= x2` and `y1 <= y2`.
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            x1: a.x.min(b.x),
            y1: a.y.min(b.y),
            x2: a.x.max(b.x),
            y2: a.y.max(b.y),
        }
    }

    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1).max(0) as u32
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1).max(0) as u32
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Normalize and clamp into a `width x height` frame. The result never
    /// addresses a pixel outside `[0, width) x [0, height)`, but may be empty.
    pub fn clamp_to(&self, width: u32, height: u32) -> Rect {
        let max_x = width.min(i32::MAX as u32) as i32;
        let max_y = height.min(i32::MAX as u32) as i32;
        let n = Rect::from_corners(Point::new(self.x1, self.y1), Point::new(self.x2, self.y2));
        Rect {
            x1: n.x1.clamp(0, max_x),
            y1: n.y1.clamp(0, max_y),
            x2: n.x2.clamp(0, max_x),
            y2: n.y2.clamp(0, max_y),
        }
    }
}
