use std::process::Stdio;

use chrono::Utc;
use framelab_common::config::CameraConfig;
use framelab_common::frame::Frame;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::source::{CaptureError, FrameSlot, FrameSource};

/// Camera read through an `ffmpeg` child that decodes any input it supports
/// (V4L2 / AVFoundation / DirectShow devices, files, network streams) into
/// packed RGB frames on stdout.
pub struct FfmpegSource {
    child: Child,
    reader: JoinHandle<()>,
    slot: FrameSlot,
    width: u32,
    height: u32,
    fps: f64,
}

/// ffmpeg arguments for reading `config.input` as `width x height` rgb24.
pub fn capture_args(config: &CameraConfig) -> Vec<String> {
    let size = format!("{}x{}", config.width, config.height);
    let fps = config.fps.to_string();
    let mut args: Vec<String> = vec!["-hide_banner".into(), "-loglevel".into(), "error".into()];
    if let Some(format) = &config.input_format {
        args.extend([
            "-f".into(),
            format.clone(),
            "-framerate".into(),
            fps.clone(),
            "-video_size".into(),
            size.clone(),
        ]);
    }
    args.extend([
        "-i".into(),
        config.input.clone(),
        "-an".into(),
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        "rgb24".into(),
        "-s".into(),
        size,
        "-r".into(),
        fps,
        "pipe:1".into(),
    ]);
    args
}

impl FfmpegSource {
    /// Start the capture process and its reader task. Must be called within
    /// a tokio runtime.
    pub fn spawn(config: &CameraConfig) -> Result<Self, CaptureError> {
        let mut child = Command::new("ffmpeg")
            .args(capture_args(config))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CaptureError::Spawn(e.to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CaptureError::Spawn("could not get stdout handle".into()))?;

        let (tx, slot) = FrameSlot::channel();
        let (width, height) = (config.width, config.height);
        let reader = tokio::spawn(async move {
            match read_frames(stdout, width, height, tx).await {
                Ok(frames) => info!(frames, "capture process closed its output"),
                Err(e) => warn!(error = %e, "capture reader stopped"),
            }
        });

        info!(input = config.input, width, height, fps = config.fps, "ffmpeg capture started");
        Ok(Self {
            child,
            reader,
            slot,
            width,
            height,
            fps: config.fps,
        })
    }
}

async fn read_frames(
    mut stdout: ChildStdout,
    width: u32,
    height: u32,
    tx: watch::Sender<Option<Frame>>,
) -> Result<u64, CaptureError> {
    let len = Frame::byte_len(width, height);
    let mut seq: u64 = 0;
    loop {
        let mut buf = vec![0u8; len];
        match stdout.read_exact(&mut buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(seq),
            Err(e) => return Err(e.into()),
        }
        let frame = match Frame::from_rgb(width, height, buf, Utc::now().timestamp_millis(), seq) {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, seq, "dropping malformed frame");
                continue;
            }
        };
        if seq % 300 == 0 {
            debug!(seq, "captured frame");
        }
        seq += 1;
        tx.send_replace(Some(frame));
    }
}

impl FrameSource for FfmpegSource {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
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
        self.reader.abort();
        if let Err(e) = self.child.start_kill() {
            debug!(error = %e, "capture process already exited");
        }
        info!("ffmpeg capture closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_input_sets_format_size_and_rate() {
        let config = CameraConfig {
            input: "/dev/video2".into(),
            input_format: Some("v4l2".into()),
            width: 320,
            height: 240,
            fps: 15.0,
            ..CameraConfig::default()
        };
        let joined = capture_args(&config).join(" ");
        assert!(joined.contains("-f v4l2 -framerate 15 -video_size 320x240 -i /dev/video2"));
        assert!(joined.ends_with("-f rawvideo -pix_fmt rgb24 -s 320x240 -r 15 pipe:1"));
    }

    #[test]
    fn file_input_has_no_format_flags() {
        let config = CameraConfig {
            input: "clip.mp4".into(),
            ..CameraConfig::default()
        };
        let args = capture_args(&config);
        assert!(!args.iter().any(|a| a == "-framerate"));
        let i = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[i + 1], "clip.mp4");
        assert_eq!(args.last().map(String::as_str), Some("pipe:1"));
    }
}
