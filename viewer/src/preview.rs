use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use framelab_common::config::PreviewConfig;
use framelab_common::frame::{Frame, FrameError};
use framelab_pipeline::display::{fit_within, DisplayError, DisplaySink};
use tokio::sync::watch;

pub const BOUNDARY: &str = "frame";

/// Display sink feeding the HTTP preview: frames are letterboxed onto the
/// preview surface and, while a stream client is connected, JPEG-encoded.
pub struct PreviewPublisher {
    surface_width: u32,
    surface_height: u32,
    quality: u8,
    frames: watch::Sender<Option<Frame>>,
    jpeg: Arc<watch::Sender<Option<Bytes>>>,
}

/// Read side of the preview, shared with the HTTP handlers.
#[derive(Clone)]
pub struct PreviewFeed {
    frames: watch::Receiver<Option<Frame>>,
    jpeg: Arc<watch::Sender<Option<Bytes>>>,
    quality: u8,
}

impl PreviewPublisher {
    pub fn new(config: &PreviewConfig) -> (Self, PreviewFeed) {
        let (frames, frames_rx) = watch::channel(None);
        let (jpeg, _) = watch::channel(None);
        let jpeg = Arc::new(jpeg);
        let publisher = Self {
            surface_width: config.surface_width,
            surface_height: config.surface_height,
            quality: config.jpeg_quality,
            frames,
            jpeg: Arc::clone(&jpeg),
        };
        let feed = PreviewFeed {
            frames: frames_rx,
            jpeg,
            quality: config.jpeg_quality,
        };
        (publisher, feed)
    }
}

impl DisplaySink for PreviewPublisher {
    fn present(&mut self, frame: &Frame) -> Result<(), DisplayError> {
        if self.frames.is_closed() {
            return Err(DisplayError::Closed);
        }
        let scaled = fit_within(frame, self.surface_width, self.surface_height);
        if self.jpeg.receiver_count() > 0 {
            let jpeg = scaled.encode_jpeg(self.quality)?;
            self.jpeg.send_replace(Some(Bytes::from(jpeg)));
        }
        self.frames.send_replace(Some(scaled));
        Ok(())
    }
}

impl PreviewFeed {
    /// Encode the most recent preview frame, if any has been presented.
    pub fn latest_jpeg(&self) -> Option<Result<Vec<u8>, FrameError>> {
        let frame = self.frames.borrow().clone()?;
        Some(frame.encode_jpeg(self.quality))
    }

    /// Subscribe to encoded frames. Encoding runs only while at least one
    /// subscriber exists.
    pub fn subscribe(&self) -> watch::Receiver<Option<Bytes>> {
        self.jpeg.subscribe()
    }

    pub fn stream_clients(&self) -> usize {
        self.jpeg.receiver_count()
    }
}

/// One `multipart/x-mixed-replace` part carrying a JPEG.
pub fn multipart_part(jpeg: &[u8]) -> Bytes {
    let header = format!(
        "--{BOUNDARY}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        jpeg.len()
    );
    let mut out = BytesMut::with_capacity(header.len() + jpeg.len() + 2);
    out.put_slice(header.as_bytes());
    out.put_slice(jpeg);
    out.put_slice(b"\r\n");
    out.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PreviewConfig {
        PreviewConfig {
            surface_width: 40,
            surface_height: 30,
            ..PreviewConfig::default()
        }
    }

    #[test]
    fn encodes_only_with_stream_clients() {
        let (mut publisher, feed) = PreviewPublisher::new(&config());
        publisher.present(&Frame::filled(80, 60, [9, 9, 9])).unwrap();
        assert_eq!(feed.stream_clients(), 0);

        let mut rx = feed.subscribe();
        assert!(rx.borrow_and_update().is_none());
        publisher.present(&Frame::filled(80, 60, [9, 9, 9])).unwrap();
        assert!(rx.has_changed().unwrap());
        let jpeg = rx.borrow_and_update().clone().unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn latest_frame_is_scaled_to_surface() {
        let (mut publisher, feed) = PreviewPublisher::new(&config());
        assert!(feed.latest_jpeg().is_none());
        publisher.present(&Frame::filled(80, 60, [200, 0, 0])).unwrap();
        let jpeg = feed.latest_jpeg().unwrap().unwrap();
        let decoded = Frame::decode(&jpeg, 0, 0).unwrap();
        assert_eq!(decoded.dimensions(), (40, 30));
    }

    #[test]
    fn dropped_feed_closes_display() {
        let (mut publisher, feed) = PreviewPublisher::new(&config());
        drop(feed);
        assert!(matches!(
            publisher.present(&Frame::filled(4, 4, [0, 0, 0])),
            Err(DisplayError::Closed)
        ));
    }

    #[test]
    fn part_layout() {
        let part = multipart_part(b"JPEG");
        assert_eq!(
            &part[..],
            b"--frame\r\nContent-Type: image/jpeg\r\nContent-Length: 4\r\n\r\nJPEG\r\n"
        );
    }
}
