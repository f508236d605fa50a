use std::process::Stdio;

use framelab_common::config::RecordingConfig;
use framelab_common::frame::Frame;
use futures_util::future::BoxFuture;
use image::imageops::{self, FilterType};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, error, info, warn};

use super::{RecorderError, SinkOpener, SinkSpec, VideoSink};

/// Opens [`FfmpegSink`]s: an `ffmpeg` child reading packed RGB frames on
/// stdin and encoding them into the container implied by the output path.
#[derive(Debug, Clone)]
pub struct FfmpegSinkOpener {
    codec: String,
    codec_tag: String,
    quality: u32,
}

impl FfmpegSinkOpener {
    pub fn new(config: &RecordingConfig) -> Self {
        Self {
            codec: config.codec.clone(),
            codec_tag: config.codec_tag.clone(),
            quality: config.quality,
        }
    }

    pub fn args(&self, spec: &SinkSpec) -> Vec<String> {
        let mut args: Vec<String> = [
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgb24",
            "-s",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.push(format!("{}x{}", spec.width, spec.height));
        args.extend(["-r".to_string(), spec.fps.to_string()]);
        args.extend(["-i".to_string(), "pipe:0".to_string()]);
        args.extend(["-c:v".to_string(), self.codec.clone()]);
        if !self.codec_tag.is_empty() {
            args.extend(["-vtag".to_string(), self.codec_tag.clone()]);
        }
        args.extend(["-q:v".to_string(), self.quality.to_string()]);
        args.push("-y".to_string());
        args.push(spec.path.to_string_lossy().into_owned());
        args
    }
}

impl SinkOpener for FfmpegSinkOpener {
    /// Spawns the encoder. Must be called within a tokio runtime.
    fn open(&self, spec: &SinkSpec) -> Result<Box<dyn VideoSink>, RecorderError> {
        if let Some(parent) = spec.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| RecorderError::Open(parent.display().to_string(), e.to_string()))?;
        }

        let mut child = Command::new("ffmpeg")
            .args(self.args(spec))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RecorderError::Spawn(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RecorderError::Spawn("could not get stdin handle".into()))?;

        debug!(
            codec = self.codec,
            tag = self.codec_tag,
            fps = spec.fps,
            width = spec.width,
            height = spec.height,
            output = %spec.path.display(),
            "ffmpeg encoder started"
        );

        Ok(Box::new(FfmpegSink {
            child,
            stdin,
            width: spec.width,
            height: spec.height,
            frames_written: 0,
        }))
    }
}

pub struct FfmpegSink {
    child: Child,
    stdin: ChildStdin,
    width: u32,
    height: u32,
    frames_written: u64,
}

impl VideoSink for FfmpegSink {
    fn write_frame<'a>(&'a mut self, frame: &'a Frame) -> BoxFuture<'a, Result<(), RecorderError>> {
        Box::pin(async move {
            let result = if frame.dimensions() == (self.width, self.height) {
                self.stdin.write_all(frame.as_bytes()).await
            } else {
                let resized =
                    imageops::resize(frame.image(), self.width, self.height, FilterType::Triangle);
                self.stdin.write_all(resized.as_raw()).await
            };
            result.map_err(|e| RecorderError::Write(e.to_string()))?;
            self.frames_written += 1;
            Ok(())
        })
    }

    fn finish(self: Box<Self>) -> BoxFuture<'static, Result<u64, RecorderError>> {
        Box::pin(async move {
            let FfmpegSink {
                child,
                mut stdin,
                frames_written,
                ..
            } = *self;
            if let Err(e) = stdin.flush().await {
                warn!(error = %e, "failed to flush ffmpeg stdin");
            }
            // Closing stdin tells ffmpeg there are no more frames.
            drop(stdin);

            let output = child
                .wait_with_output()
                .await
                .map_err(|e| RecorderError::Wait(e.to_string()))?;
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                error!(stderr = %stderr, "ffmpeg exited with error");
                return Err(RecorderError::FfmpegFailed(stderr.into_owned()));
            }

            info!(frames_written, "recording encoder finished");
            Ok(frames_written)
        })
    }
}

/// Check whether ffmpeg is available on PATH. Logs a warning if not found.
pub async fn check_ffmpeg_available() -> bool {
    match Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await
    {
        Ok(out) if out.status.success() => {
            debug!("ffmpeg is available");
            true
        }
        Ok(_) => {
            warn!("ffmpeg returned non-zero for -version; capture and recording may fail");
            false
        }
        Err(e) => {
            warn!(error = %e, "ffmpeg not found on PATH; capture and recording will fail");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn spec() -> SinkSpec {
        SinkSpec {
            path: PathBuf::from("captures/recording.avi"),
            fps: 30.0,
            width: 640,
            height: 480,
        }
    }

    #[test]
    fn args_describe_raw_rgb_input_and_xvid_output() {
        let opener = FfmpegSinkOpener::new(&RecordingConfig::default());
        let args = opener.args(&spec());
        let joined = args.join(" ");
        assert!(joined.contains("-f rawvideo -pix_fmt rgb24 -s 640x480 -r 30 -i pipe:0"));
        assert!(joined.contains("-c:v mpeg4 -vtag XVID -q:v 5"));
        assert_eq!(args.last().map(String::as_str), Some("captures/recording.avi"));
    }

    #[test]
    fn empty_codec_tag_is_omitted() {
        let config = RecordingConfig {
            codec: "libx264".into(),
            codec_tag: String::new(),
            ..RecordingConfig::default()
        };
        let args = FfmpegSinkOpener::new(&config).args(&spec());
        assert!(!args.iter().any(|a| a == "-vtag"));
        assert!(args.iter().any(|a| a == "libx264"));
    }

    #[test]
    fn fractional_rate_is_passed_through() {
        let opener = FfmpegSinkOpener::new(&RecordingConfig::default());
        let args = opener.args(&SinkSpec { fps: 29.97, ..spec() });
        let r = args.iter().position(|a| a == "-r").unwrap();
        assert_eq!(args[r + 1], "29.97");
    }
}
