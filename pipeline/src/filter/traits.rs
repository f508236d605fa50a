use image::RgbImage;

/// A pure region-to-region image transform.
///
/// Implementations receive an owned region and return a region with the
/// same width, height and channel count. Per-pixel filters rewrite the
/// buffer they were given; kernel filters return a fresh buffer.
pub trait RegionFilter: Send + Sync {
    fn apply(&self, region: RgbImage) -> RgbImage;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}
