use std::time::Duration;

use framelab_common::config::CameraConfig;
use framelab_common::frame::Frame;
use tokio::sync::watch;
use tracing::info;

use crate::ffmpeg::FfmpegSource;
use crate::mjpeg::MjpegSource;
use crate::pattern::PatternSource;

/// A camera delivering frames into a latest-value slot.
///
/// `read_frame` never blocks: it returns the newest frame once, and `None`
/// until another one arrives.
pub trait FrameSource: Send {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    /// Rate the camera claims to run at. May be 0 when unknown.
    fn nominal_fps(&self) -> f64;
    fn read_frame(&mut self) -> Option<Frame>;
    fn latest_frame(&self) -> Option<Frame>;
    fn subscribe(&self) -> watch::Receiver<Option<Frame>>;
    /// Release the device. Further reads return nothing new.
    fn close(&mut self);
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("unknown camera source {0:?}, expected 'ffmpeg', 'mjpeg' or 'pattern'")]
    UnknownSource(String),
    #[error("camera.url must be set for the mjpeg source")]
    MissingUrl,
    #[error("failed to spawn ffmpeg: {0}")]
    Spawn(String),
    #[error("failed to read from capture process: {0}")]
    Read(#[from] std::io::Error),
    #[error("HTTP connection failed: {0}")]
    HttpConnect(reqwest::Error),
    #[error("HTTP stream error: {0}")]
    HttpStream(reqwest::Error),
    #[error("HTTP status {0}")]
    HttpStatus(u16),
    #[error("no frame from camera within {0:?}")]
    StartupTimeout(Duration),
    #[error("camera stream ended")]
    Ended,
}

/// Receiving half of a source's latest-frame slot.
#[derive(Debug, Clone)]
pub struct FrameSlot {
    rx: watch::Receiver<Option<Frame>>,
}

impl FrameSlot {
    pub fn channel() -> (watch::Sender<Option<Frame>>, Self) {
        let (tx, rx) = watch::channel(None);
        (tx, Self { rx })
    }

    /// The newest frame if it has not been read yet.
    pub fn take_new(&mut self) -> Option<Frame> {
        if self.rx.has_changed().unwrap_or(false) {
            self.rx.borrow_and_update().clone()
        } else {
            None
        }
    }

    pub fn latest(&self) -> Option<Frame> {
        self.rx.borrow().clone()
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.rx.borrow().as_ref().map(Frame::dimensions)
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Frame>> {
        self.rx.clone()
    }
}

/// Wait until the source has produced its first frame. Returns that
/// frame's dimensions.
pub async fn wait_ready(source: &dyn FrameSource, timeout: Duration) -> Result<(u32, u32), CaptureError> {
    let mut rx = source.subscribe();
    let result = match tokio::time::timeout(timeout, rx.wait_for(Option::is_some)).await {
        Ok(Ok(frame)) => Ok((*frame)
            .as_ref()
            .map(Frame::dimensions)
            .unwrap_or((source.width(), source.height()))),
        Ok(Err(_)) => Err(CaptureError::Ended),
        Err(_) => Err(CaptureError::StartupTimeout(timeout)),
    };
    result
}

/// Build the source named by `config.source`.
pub fn open_source(config: &CameraConfig) -> Result<Box<dyn FrameSource>, CaptureError> {
    info!(
        source = config.source,
        width = config.width,
        height = config.height,
        fps = config.fps,
        "opening camera"
    );
    match config.source.as_str() {
        "ffmpeg" => Ok(Box::new(FfmpegSource::spawn(config)?)),
        "mjpeg" => {
            if config.url.is_empty() {
                return Err(CaptureError::MissingUrl);
            }
            Ok(Box::new(MjpegSource::connect(config)))
        }
        "pattern" => Ok(Box::new(PatternSource::new(config.width, config.height, config.fps))),
        other => Err(CaptureError::UnknownSource(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_hands_out_each_frame_once() {
        let (tx, mut slot) = FrameSlot::channel();
        assert!(slot.take_new().is_none());
        tx.send_replace(Some(Frame::filled(2, 2, [1, 1, 1])));
        assert!(slot.take_new().is_some());
        assert!(slot.take_new().is_none());
        assert!(slot.latest().is_some());
    }

    #[tokio::test]
    async fn pattern_source_is_ready_immediately() {
        let source = PatternSource::new(32, 24, 30.0);
        let dims = wait_ready(&source, Duration::from_millis(100)).await.unwrap();
        assert_eq!(dims, (32, 24));
    }

    #[tokio::test]
    async fn silent_source_times_out() {
        let (_tx, slot) = FrameSlot::channel();
        struct Silent(FrameSlot);
        impl FrameSource for Silent {
            fn width(&self) -> u32 {
                4
            }
            fn height(&self) -> u32 {
                4
            }
            fn nominal_fps(&self) -> f64 {
                0.0
            }
            fn read_frame(&mut self) -> Option<Frame> {
                self.0.take_new()
            }
            fn latest_frame(&self) -> Option<Frame> {
                self.0.latest()
            }
            fn subscribe(&self) -> watch::Receiver<Option<Frame>> {
                self.0.subscribe()
            }
            fn close(&mut self) {}
        }
        let err = wait_ready(&Silent(slot), Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, CaptureError::StartupTimeout(_)));
    }

    #[test]
    fn unknown_source_is_rejected() {
        let config = CameraConfig {
            source: "v4l".into(),
            ..CameraConfig::default()
        };
        assert!(matches!(
            open_source(&config).err(),
            Some(CaptureError::UnknownSource(_))
        ));
    }

    #[test]
    fn mjpeg_requires_url() {
        let config = CameraConfig {
            source: "mjpeg".into(),
            ..CameraConfig::default()
        };
        assert!(matches!(open_source(&config).err(), Some(CaptureError::MissingUrl)));
    }
}
