//! User-controlled pipeline parameters.
//!
//! [`InteractionState`] is mutated only through [`InteractionState::apply`],
//! one [`InteractionEvent`] at a time, and read by the compositor through a
//! shared borrow once per frame.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::geometry::{Point, Rect};

pub const DEFAULT_LOW_THRESHOLD: u8 = 50;
pub const DEFAULT_HIGH_THRESHOLD: u8 = 150;

/// The color filters offered alongside edge detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    #[default]
    None,
    Grayscale,
    Sepia,
    Blur,
    Sharpen,
    Invert,
}

impl FilterKind {
    pub const ALL: [FilterKind; 6] = [
        FilterKind::None,
        FilterKind::Grayscale,
        FilterKind::Sepia,
        FilterKind::Blur,
        FilterKind::Sharpen,
        FilterKind::Invert,
    ];
}

/// Where the user is in drawing a region of interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum RoiPhase {
    #[default]
    Idle,
    /// Pointer is down; `end` follows the pointer.
    Drawing { start: Point, end: Point },
    Committed,
}

/// One discrete user action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InteractionEvent {
    EdgeDetectionToggled { enabled: bool },
    LowThresholdChanged { value: i32 },
    HighThresholdChanged { value: i32 },
    FilterSelected { filter: FilterKind },
    RoiModeToggled { armed: bool },
    RoiReset,
    PointerDown { x: i32, y: i32 },
    PointerMove { x: i32, y: i32 },
    PointerUp { x: i32, y: i32 },
    /// Issued by the controller once a recording sink has actually opened or closed.
    RecordingChanged { active: bool },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InteractionState {
    filter: FilterKind,
    edge_detection: bool,
    low_threshold: u8,
    high_threshold: u8,
    roi: Option<Rect>,
    roi_mode_armed: bool,
    phase: RoiPhase,
    recording: bool,
    frame_width: u32,
    frame_height: u32,
}

impl InteractionState {
    /// Startup defaults for a source producing `width x height` frames.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            filter: FilterKind::None,
            edge_detection: false,
            low_threshold: DEFAULT_LOW_THRESHOLD,
            high_threshold: DEFAULT_HIGH_THRESHOLD,
            roi: None,
            roi_mode_armed: false,
            phase: RoiPhase::Idle,
            recording: false,
            frame_width: width,
            frame_height: height,
        }
    }

    pub fn apply(&mut self, event: InteractionEvent) {
        debug!(?event, "applying interaction event");
        match event {
            InteractionEvent::EdgeDetectionToggled { enabled } => self.edge_detection = enabled,
            InteractionEvent::LowThresholdChanged { value } => {
                self.low_threshold = clamp_threshold(value)
            }
            InteractionEvent::HighThresholdChanged { value } => {
                self.high_threshold = clamp_threshold(value)
            }
            InteractionEvent::FilterSelected { filter } => self.filter = filter,
            InteractionEvent::RoiModeToggled { armed } => {
                self.roi_mode_armed = armed;
                if !armed {
                    // Disarming mid-draw discards the partial rectangle.
                    self.clear_roi();
                }
            }
            InteractionEvent::RoiReset => self.clear_roi(),
            InteractionEvent::PointerDown { x, y } => {
                if self.roi_mode_armed {
                    let p = Point::new(x, y);
                    self.phase = RoiPhase::Drawing { start: p, end: p };
                }
            }
            InteractionEvent::PointerMove { x, y } => {
                if let RoiPhase::Drawing { start, .. } = self.phase {
                    self.phase = RoiPhase::Drawing {
                        start,
                        end: Point::new(x, y),
                    };
                }
            }
            InteractionEvent::PointerUp { x, y } => {
                if let RoiPhase::Drawing { start, .. } = self.phase {
                    let rect = Rect::from_corners(start, Point::new(x, y))
                        .clamp_to(self.frame_width, self.frame_height);
                    self.roi = Some(rect);
                    self.phase = RoiPhase::Committed;
                }
            }
            InteractionEvent::RecordingChanged { active } => self.recording = active,
        }
    }

    fn clear_roi(&mut self) {
        self.roi = None;
        self.phase = RoiPhase::Idle;
    }

    /// Record a change in the source's frame size; a committed ROI is re-clamped.
    pub fn set_frame_size(&mut self, width: u32, height: u32) {
        self.frame_width = width;
        self.frame_height = height;
        if let Some(roi) = self.roi {
            self.roi = Some(roi.clamp_to(width, height));
        }
    }

    pub fn filter(&self) -> FilterKind {
        self.filter
    }

    pub fn edge_detection(&self) -> bool {
        self.edge_detection
    }

    /// `(low, high)`. No ordering is enforced between the two.
    pub fn thresholds(&self) -> (u8, u8) {
        (self.low_threshold, self.high_threshold)
    }

    pub fn roi(&self) -> Option<Rect> {
        self.roi
    }

    pub fn roi_mode_armed(&self) -> bool {
        self.roi_mode_armed
    }

    pub fn phase(&self) -> RoiPhase {
        self.phase
    }

    /// The rectangle currently being dragged out, if any, normalized but not clamped.
    pub fn live_selection(&self) -> Option<Rect> {
        match self.phase {
            RoiPhase::Drawing { start, end } => Some(Rect::from_corners(start, end)),
            _ => None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn frame_size(&self) -> (u32, u32) {
        (self.frame_width, self.frame_height)
    }
}

fn clamp_threshold(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn armed() -> InteractionState {
        let mut s = InteractionState::new(640, 480);
        s.apply(InteractionEvent::RoiModeToggled { armed: true });
        s
    }

    #[test]
    fn defaults() {
        let s = InteractionState::new(640, 480);
        assert_eq!(s.filter(), FilterKind::None);
        assert!(!s.edge_detection());
        assert_eq!(s.thresholds(), (50, 150));
        assert_eq!(s.roi(), None);
        assert_eq!(s.phase(), RoiPhase::Idle);
        assert!(!s.is_recording());
    }

    #[test]
    fn thresholds_clamp_on_write() {
        let mut s = InteractionState::new(640, 480);
        s.apply(InteractionEvent::LowThresholdChanged { value: -10 });
        s.apply(InteractionEvent::HighThresholdChanged { value: 400 });
        assert_eq!(s.thresholds(), (0, 255));
    }

    #[test]
    fn inverted_thresholds_are_accepted() {
        let mut s = InteractionState::new(640, 480);
        s.apply(InteractionEvent::LowThresholdChanged { value: 200 });
        s.apply(InteractionEvent::HighThresholdChanged { value: 20 });
        assert_eq!(s.thresholds(), (200, 20));
    }

    #[test]
    fn pointer_ignored_while_disarmed() {
        let mut s = InteractionState::new(640, 480);
        s.apply(InteractionEvent::PointerDown { x: 10, y: 10 });
        assert_eq!(s.phase(), RoiPhase::Idle);
        s.apply(InteractionEvent::PointerUp { x: 50, y: 50 });
        assert_eq!(s.roi(), None);
    }

    #[test]
    fn draw_and_commit_normalizes() {
        let mut s = armed();
        s.apply(InteractionEvent::PointerDown { x: 300, y: 200 });
        s.apply(InteractionEvent::PointerMove { x: 100, y: 50 });
        assert_eq!(
            s.live_selection(),
            Some(Rect { x1: 100, y1: 50, x2: 300, y2: 200 })
        );
        s.apply(InteractionEvent::PointerUp { x: 100, y: 50 });
        assert_eq!(s.phase(), RoiPhase::Committed);
        assert_eq!(s.roi(), Some(Rect { x1: 100, y1: 50, x2: 300, y2: 200 }));
        assert_eq!(s.live_selection(), None);
    }

    #[test]
    fn commit_clamps_to_frame() {
        let mut s = armed();
        s.apply(InteractionEvent::PointerDown { x: -30, y: 400 });
        s.apply(InteractionEvent::PointerUp { x: 900, y: 700 });
        assert_eq!(s.roi(), Some(Rect { x1: 0, y1: 400, x2: 640, y2: 480 }));
    }

    #[test]
    fn disarm_mid_draw_forces_idle() {
        let mut s = armed();
        s.apply(InteractionEvent::PointerDown { x: 10, y: 10 });
        s.apply(InteractionEvent::PointerMove { x: 90, y: 90 });
        s.apply(InteractionEvent::RoiModeToggled { armed: false });
        assert_eq!(s.phase(), RoiPhase::Idle);
        assert_eq!(s.roi(), None);
        // The release that follows belongs to no drawing.
        s.apply(InteractionEvent::PointerUp { x: 90, y: 90 });
        assert_eq!(s.roi(), None);
    }

    #[test]
    fn reset_clears_committed_roi() {
        let mut s = armed();
        s.apply(InteractionEvent::PointerDown { x: 10, y: 10 });
        s.apply(InteractionEvent::PointerUp { x: 20, y: 20 });
        s.apply(InteractionEvent::RoiReset);
        assert_eq!(s.roi(), None);
        assert_eq!(s.phase(), RoiPhase::Idle);
        assert!(s.roi_mode_armed());
    }

    #[test]
    fn redraw_keeps_previous_roi_until_commit() {
        let mut s = armed();
        s.apply(InteractionEvent::PointerDown { x: 10, y: 10 });
        s.apply(InteractionEvent::PointerUp { x: 20, y: 20 });
        s.apply(InteractionEvent::PointerDown { x: 100, y: 100 });
        assert_eq!(s.roi(), Some(Rect { x1: 10, y1: 10, x2: 20, y2: 20 }));
        s.apply(InteractionEvent::PointerUp { x: 150, y: 120 });
        assert_eq!(s.roi(), Some(Rect { x1: 100, y1: 100, x2: 150, y2: 120 }));
    }

    #[test]
    fn frame_size_change_reclamps_roi() {
        let mut s = armed();
        s.apply(InteractionEvent::PointerDown { x: 300, y: 200 });
        s.apply(InteractionEvent::PointerUp { x: 600, y: 400 });
        s.set_frame_size(320, 240);
        assert_eq!(s.roi(), Some(Rect { x1: 300, y1: 200, x2: 320, y2: 240 }));
    }

    #[test]
    fn events_use_tagged_json() {
        let event: InteractionEvent =
            serde_json::from_str(r#"{"type":"filter_selected","filter":"sepia"}"#).unwrap();
        assert_eq!(
            event,
            InteractionEvent::FilterSelected {
                filter: FilterKind::Sepia
            }
        );
        let json = serde_json::to_string(&InteractionEvent::RoiReset).unwrap();
        assert_eq!(json, r#"{"type":"roi_reset"}"#);
    }
}
