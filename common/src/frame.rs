use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};

/// Bytes per pixel of every frame in the pipeline (8-bit R, G, B).
pub const CHANNELS: usize = 3;

/// A camera frame with capture metadata.
///
/// Pixels are stored as packed RGB rows. A frame has exactly one owner at a
/// time: capture hands it to the compositor, the compositor hands its output
/// to the display and recording sinks.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    image: RgbImage,
    pub captured_at_ms: i64,
    pub seq: u64,
}

impl Frame {
    pub fn new(image: RgbImage, captured_at_ms: i64, seq: u64) -> Self {
        Self {
            image,
            captured_at_ms,
            seq,
        }
    }

    /// Build a frame from a packed RGB buffer.
    ///
    /// Trailing bytes beyond `width * height * 3` are ignored.
    pub fn from_rgb(
        width: u32,
        height: u32,
        mut data: Vec<u8>,
        captured_at_ms: i64,
        seq: u64,
    ) -> Result<Self, FrameError> {
        let expected = Self::byte_len(width, height);
        if data.len() < expected {
            return Err(FrameError::TooShort {
                got: data.len(),
                expected,
            });
        }
        data.truncate(expected);
        let image = RgbImage::from_raw(width, height, data).ok_or(FrameError::TooShort {
            got: 0,
            expected,
        })?;
        Ok(Self::new(image, captured_at_ms, seq))
    }

    /// A frame filled with a single color. Mostly useful for tests and idle sources.
    pub fn filled(width: u32, height: u32, color: [u8; 3]) -> Self {
        Self::new(RgbImage::from_pixel(width, height, Rgb(color)), 0, 0)
    }

    /// Number of bytes a packed RGB frame of this size occupies.
    pub fn byte_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * CHANNELS
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut RgbImage {
        &mut self.image
    }

    /// Replace the pixel buffer, keeping the capture metadata.
    pub fn map_image(self, f: impl FnOnce(RgbImage) -> RgbImage) -> Self {
        Self {
            image: f(self.image),
            captured_at_ms: self.captured_at_ms,
            seq: self.seq,
        }
    }

    /// Raw packed RGB bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// Encode as baseline JPEG.
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, FrameError> {
        let mut buf = Vec::with_capacity(self.as_bytes().len() / 8);
        JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100))
            .encode_image(&self.image)
            .map_err(|e| FrameError::Encode(e.to_string()))?;
        Ok(buf)
    }

    /// Decode a JPEG (or any format `image` can sniff) into an RGB frame.
    pub fn decode(data: &[u8], captured_at_ms: i64, seq: u64) -> Result<Self, FrameError> {
        let image = image::load_from_memory(data)
            .map_err(|e| FrameError::Decode(e.to_string()))?
            .to_rgb8();
        Ok(Self::new(image, captured_at_ms, seq))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame buffer too short: got {got} bytes, expected at least {expected}")]
    TooShort { got: usize, expected: usize },
    #[error("failed to encode frame: {0}")]
    Encode(String),
    #[error("failed to decode frame: {0}")]
    Decode(String),
}
