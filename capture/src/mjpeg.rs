use std::time::Duration;

use bytes::BytesMut;
use chrono::Utc;
use framelab_common::config::CameraConfig;
use framelab_common::frame::Frame;
use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::source::{CaptureError, FrameSlot, FrameSource};

const BOUNDARY: &[u8] = b"--frame\r\n";
const HEADER_END: &[u8] = b"\r\n\r\n";

const INITIAL_BACKOFF: Duration = Duration::from_secs(2);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Parse state for the MJPEG multipart stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    /// Looking for the boundary marker `--frame\r\n`.
    SeekingBoundary,
    /// Found boundary, now looking for end of headers `\r\n\r\n`.
    SeekingHeaderEnd,
    /// Collecting JPEG bytes until the next boundary.
    CollectingJpeg,
}

/// Incremental splitter for a `multipart/x-mixed-replace; boundary=frame`
/// body. Chunks may split boundaries and headers anywhere.
pub struct MultipartParser {
    buffer: BytesMut,
    state: ParseState,
    jpeg_start: usize,
}

impl Default for MultipartParser {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartParser {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(256 * 1024),
            state: ParseState::SeekingBoundary,
            jpeg_start: 0,
        }
    }

    /// Feed one chunk; returns every part body completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(chunk);
        let mut parts = Vec::new();

        loop {
            match self.state {
                ParseState::SeekingBoundary => {
                    if let Some(pos) = find_subsequence(&self.buffer, BOUNDARY) {
                        let _ = self.buffer.split_to(pos + BOUNDARY.len());
                        self.state = ParseState::SeekingHeaderEnd;
                    } else {
                        // Keep the tail in case the boundary spans chunks.
                        if self.buffer.len() > BOUNDARY.len() {
                            let _ = self.buffer.split_to(self.buffer.len() - BOUNDARY.len());
                        }
                        break;
                    }
                }
                ParseState::SeekingHeaderEnd => {
                    if let Some(pos) = find_subsequence(&self.buffer, HEADER_END) {
                        let _ = self.buffer.split_to(pos + HEADER_END.len());
                        self.jpeg_start = 0;
                        self.state = ParseState::CollectingJpeg;
                    } else {
                        break;
                    }
                }
                ParseState::CollectingJpeg => {
                    let Some(pos) = find_subsequence(&self.buffer[self.jpeg_start..], BOUNDARY) else {
                        // Resume the search near the end next time.
                        self.jpeg_start = self.buffer.len().saturating_sub(BOUNDARY.len());
                        break;
                    };
                    let jpeg_end = self.jpeg_start + pos;
                    let end = if self.buffer[..jpeg_end].ends_with(b"\r\n") {
                        jpeg_end - 2
                    } else {
                        jpeg_end
                    };
                    let part = self.buffer[..end].to_vec();
                    let _ = self.buffer.split_to(jpeg_end + BOUNDARY.len());
                    if !part.is_empty() {
                        parts.push(part);
                    }
                    self.state = ParseState::SeekingHeaderEnd;
                }
            }
        }
        parts
    }
}

/// Find the position of `needle` in `haystack`.
fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Camera read from an MJPEG-over-HTTP stream, reconnecting forever.
pub struct MjpegSource {
    task: JoinHandle<()>,
    slot: FrameSlot,
    width: u32,
    height: u32,
    fps: f64,
}

impl MjpegSource {
    /// Start streaming from `config.url`. Must be called within a tokio runtime.
    pub fn connect(config: &CameraConfig) -> Self {
        let (tx, slot) = FrameSlot::channel();
        let url = config.url.clone();
        let task = tokio::spawn(async move { run_stream(url, tx).await });
        Self {
            task,
            slot,
            width: config.width,
            height: config.height,
            fps: config.fps,
        }
    }
}

/// Consume the stream, reconnecting with exponential backoff on failure.
async fn run_stream(url: String, tx: watch::Sender<Option<Frame>>) {
    let mut backoff = INITIAL_BACKOFF;
    let mut seq: u64 = 0;

    loop {
        info!(url, "connecting to MJPEG stream");
        match consume_stream(&url, &tx, &mut seq).await {
            Ok(()) => {
                info!("stream ended cleanly, reconnecting");
                backoff = INITIAL_BACKOFF;
            }
            Err(e) => {
                error!(error = %e, "stream error, reconnecting in {:?}", backoff);
            }
        }
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

async fn consume_stream(
    url: &str,
    tx: &watch::Sender<Option<Frame>>,
    seq: &mut u64,
) -> Result<(), CaptureError> {
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(CaptureError::HttpConnect)?;
    let response = client
        .get(url)
        .send()
        .await
        .map_err(CaptureError::HttpConnect)?;

    if !response.status().is_success() {
        return Err(CaptureError::HttpStatus(response.status().as_u16()));
    }

    info!(status = %response.status(), "connected to MJPEG stream");

    let mut byte_stream = response.bytes_stream();
    let mut parser = MultipartParser::new();

    while let Some(chunk) = byte_stream.next().await {
        let chunk = chunk.map_err(CaptureError::HttpStream)?;
        for jpeg in parser.push(&chunk) {
            match Frame::decode(&jpeg, Utc::now().timestamp_millis(), *seq) {
                Ok(frame) => {
                    debug!(seq = *seq, bytes = jpeg.len(), "decoded MJPEG frame");
                    *seq += 1;
                    tx.send_replace(Some(frame));
                }
                Err(e) => warn!(error = %e, bytes = jpeg.len(), "skipping undecodable part"),
            }
        }
    }

    Ok(())
}

impl FrameSource for MjpegSource {
    fn width(&self) -> u32 {
        self.slot.dimensions().map_or(self.width, |(w, _)| w)
    }

    fn height(&self) -> u32 {
        self.slot.dimensions().map_or(self.height, |(_, h)| h)
    }

    fn nominal_fps(&self) -> f64 {
        self.fps
    }

    fn read_frame(&mut self) -> Option<Frame> {
        self.slot.take_new()
    }

    fn latest_frame(&self) -> Option<Frame> {
        self.slot.latest()
    }

    fn subscribe(&self) -> watch::Receiver<Option<Frame>> {
        self.slot.subscribe()
    }

    fn close(&mut self) {
        self.task.abort();
        info!("MJPEG capture closed");
    }
}
