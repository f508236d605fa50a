pub mod color;
pub mod edges;
pub mod kernel;
pub mod traits;

use framelab_common::state::{FilterKind, InteractionState};
use image::{Rgb, RgbImage};

pub use color::{Grayscale, Invert, Sepia};
pub use edges::EdgeDetector;
pub use kernel::{Blur, Sharpen};
pub use traits::RegionFilter;

static GRAYSCALE: Grayscale = Grayscale;
static SEPIA: Sepia = Sepia;
static BLUR: Blur = Blur {
    kernel_size: kernel::BLUR_KERNEL_SIZE,
};
static SHARPEN: Sharpen = Sharpen;
static INVERT: Invert = Invert;

/// The filter implementing `kind`, or `None` for the identity.
pub fn filter_for(kind: FilterKind) -> Option<&'static dyn RegionFilter> {
    match kind {
        FilterKind::None => None,
        FilterKind::Grayscale => Some(&GRAYSCALE),
        FilterKind::Sepia => Some(&SEPIA),
        FilterKind::Blur => Some(&BLUR),
        FilterKind::Sharpen => Some(&SHARPEN),
        FilterKind::Invert => Some(&INVERT),
    }
}

/// Apply the filter bank entry for `kind` to a region.
pub fn apply_filter(kind: FilterKind, region: RgbImage) -> RgbImage {
    match filter_for(kind) {
        Some(filter) => filter.apply(region),
        None => region,
    }
}

/// The single effect the current interaction state selects. Edge detection
/// wins over any selected filter.
pub enum Transform {
    Identity,
    Edges(EdgeDetector),
    Filter(&'static dyn RegionFilter),
}

impl Transform {
    pub fn select(state: &InteractionState, edge_color: Rgb<u8>) -> Self {
        if state.edge_detection() {
            let (low, high) = state.thresholds();
            return Transform::Edges(EdgeDetector::new(low, high).with_edge_color(edge_color));
        }
        match filter_for(state.filter()) {
            Some(filter) => Transform::Filter(filter),
            None => Transform::Identity,
        }
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, Transform::Identity)
    }

    pub fn apply(&self, region: RgbImage) -> RgbImage {
        match self {
            Transform::Identity => region,
            Transform::Edges(detector) => detector.apply(region),
            Transform::Filter(filter) => filter.apply(region),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Transform::Identity => "identity",
            Transform::Edges(detector) => detector.name(),
            Transform::Filter(filter) => filter.name(),
        }
    }
}
