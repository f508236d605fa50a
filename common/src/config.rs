use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    /// One of "ffmpeg", "mjpeg" or "pattern".
    #[serde(default = "default_source")]
    pub source: String,
    /// ffmpeg input: a device node, file or URL.
    #[serde(default = "default_input")]
    pub input: String,
    /// ffmpeg input format (`-f`), e.g. "v4l2", "avfoundation", "dshow".
    #[serde(default)]
    pub input_format: Option<String>,
    /// MJPEG stream URL, used when `source = "mjpeg"`.
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: f64,
    /// Seconds to wait for the first frame before giving up.
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_stats_interval")]
    pub stats_interval_ms: u64,
    #[serde(default = "default_edge_color")]
    pub edge_color: [u8; 3],
    #[serde(default = "default_roi_color")]
    pub roi_color: [u8; 3],
    #[serde(default = "default_selection_color")]
    pub selection_color: [u8; 3],
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordingConfig {
    /// ffmpeg video encoder.
    #[serde(default = "default_codec")]
    pub codec: String,
    /// Four-character codec tag written into the container.
    #[serde(default = "default_codec_tag")]
    pub codec_tag: String,
    #[serde(default = "default_quality")]
    pub quality: u32,
    /// Frames buffered between the tick and the writer before frames are dropped.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreviewConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_surface_width")]
    pub surface_width: u32,
    #[serde(default = "default_surface_height")]
    pub surface_height: u32,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            source: default_source(),
            input: default_input(),
            input_format: None,
            url: String::new(),
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            startup_timeout_secs: default_startup_timeout(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
            stats_interval_ms: default_stats_interval(),
            edge_color: default_edge_color(),
            roi_color: default_roi_color(),
            selection_color: default_selection_color(),
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            codec: default_codec(),
            codec_tag: default_codec_tag(),
            quality: default_quality(),
            queue_depth: default_queue_depth(),
        }
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            surface_width: default_surface_width(),
            surface_height: default_surface_height(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        if config.camera.width == 0 || config.camera.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "camera size must be non-zero, got {}x{}",
                config.camera.width, config.camera.height
            )));
        }
        if config.pipeline.tick_interval_ms == 0 || config.pipeline.stats_interval_ms == 0 {
            return Err(ConfigError::Invalid("tick intervals must be non-zero".into()));
        }
        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_source() -> String {
    "ffmpeg".into()
}
fn default_input() -> String {
    "/dev/video0".into()
}
fn default_width() -> u32 {
    640
}
fn default_height() -> u32 {
    480
}
fn default_fps() -> f64 {
    30.0
}
fn default_startup_timeout() -> u64 {
    10
}
fn default_tick_interval() -> u64 {
    33
}
fn default_stats_interval() -> u64 {
    1000
}
fn default_edge_color() -> [u8; 3] {
    [255, 255, 255]
}
fn default_roi_color() -> [u8; 3] {
    [0, 255, 0]
}
fn default_selection_color() -> [u8; 3] {
    [0, 0, 255]
}
fn default_codec() -> String {
    "mpeg4".into()
}
fn default_codec_tag() -> String {
    "XVID".into()
}
fn default_quality() -> u32 {
    5
}
fn default_queue_depth() -> usize {
    32
}
fn default_bind() -> String {
    "127.0.0.1:8080".into()
}
fn default_surface_width() -> u32 {
    800
}
fn default_surface_height() -> u32 {
    600
}
fn default_jpeg_quality() -> u8 {
    80
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("captures")
}
fn default_log_level() -> String {
    "info".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.camera.source, "ffmpeg");
        assert_eq!((config.camera.width, config.camera.height), (640, 480));
        assert_eq!(config.pipeline.tick_interval_ms, 33);
        assert_eq!(config.pipeline.roi_color, [0, 255, 0]);
        assert_eq!(config.recording.codec_tag, "XVID");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn example_config_parses() {
        let config = Config::parse(include_str!("../../config.example.toml")).unwrap();
        assert_eq!(config.camera.input_format.as_deref(), Some("v4l2"));
        assert_eq!(config.preview.surface_width, 800);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = Config::parse(
            r#"
            [camera]
            source = "pattern"
            width = 320

            [preview]
            bind = "0.0.0.0:9000"
            "#,
        )
        .unwrap();
        assert_eq!(config.camera.source, "pattern");
        assert_eq!(config.camera.width, 320);
        assert_eq!(config.camera.height, 480);
        assert_eq!(config.preview.bind, "0.0.0.0:9000");
        assert_eq!(config.preview.jpeg_quality, 80);
    }

    #[test]
    fn zero_sized_camera_rejected() {
        let err = Config::parse("[camera]\nwidth = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = Config::parse("[camera\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
