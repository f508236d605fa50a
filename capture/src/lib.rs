pub mod ffmpeg;
pub mod mjpeg;
pub mod pattern;
pub mod source;

pub use source::{open_source, wait_ready, CaptureError, FrameSource};
