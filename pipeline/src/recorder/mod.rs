//! Recording of composed frames to a video file.
//!
//! [`Recorder`] owns at most one session. Frames are handed to a writer
//! task through a bounded queue; the [`VideoSink`] it writes to is
//! produced by a [`SinkOpener`], normally [`FfmpegSinkOpener`].

pub mod encoder;
pub mod session;

use std::path::PathBuf;

use framelab_common::frame::Frame;
use futures_util::future::BoxFuture;

pub use encoder::{check_ffmpeg_available, FfmpegSinkOpener};
pub use session::{Recorder, RecordingSummary};

/// Frame rate used when a source reports none.
pub const FALLBACK_FPS: f64 = 30.0;

/// Parameters a sink is opened with.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkSpec {
    pub path: PathBuf,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
}

/// An open video file accepting frames in order.
pub trait VideoSink: Send {
    fn write_frame<'a>(&'a mut self, frame: &'a Frame) -> BoxFuture<'a, Result<(), RecorderError>>;

    /// Flush and close the file. Returns the number of frames written.
    fn finish(self: Box<Self>) -> BoxFuture<'static, Result<u64, RecorderError>>;
}

pub trait SinkOpener: Send + Sync {
    fn open(&self, spec: &SinkSpec) -> Result<Box<dyn VideoSink>, RecorderError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("a recording is already in progress")]
    AlreadyRecording,
    #[error("failed to open recording sink {0}: {1}")]
    Open(String, String),
    #[error("failed to spawn ffmpeg: {0}")]
    Spawn(String),
    #[error("failed to write frame to ffmpeg stdin: {0}")]
    Write(String),
    #[error("failed to wait for ffmpeg: {0}")]
    Wait(String),
    #[error("ffmpeg exited with non-zero status: {0}")]
    FfmpegFailed(String),
    #[error("recording writer stopped")]
    Closed,
    #[error("recording writer task failed: {0}")]
    Join(String),
}
