use std::path::{Path, PathBuf};

use framelab_common::frame::Frame;
use image::ImageFormat;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("no frame available to snapshot")]
    NoFrame,
    #[error("unsupported snapshot format {0:?}, expected png, jpg, jpeg or bmp")]
    UnsupportedFormat(String),
    #[error("failed to create directory {0}: {1}")]
    CreateDir(String, std::io::Error),
    #[error("failed to write snapshot {0}: {1}")]
    Write(String, image::ImageError),
}

fn format_for(path: &Path) -> Result<ImageFormat, SnapshotError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "png" => Ok(ImageFormat::Png),
        "jpg" | "jpeg" => Ok(ImageFormat::Jpeg),
        "bmp" => Ok(ImageFormat::Bmp),
        _ => Err(SnapshotError::UnsupportedFormat(ext)),
    }
}

/// Write `frame` to `path`, creating parent directories as needed. The
/// image format follows the file extension.
pub fn export(frame: &Frame, path: &Path) -> Result<PathBuf, SnapshotError> {
    let format = format_for(path)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| SnapshotError::CreateDir(parent.display().to_string(), e))?;
    }
    frame
        .image()
        .save_with_format(path, format)
        .map_err(|e| SnapshotError::Write(path.display().to_string(), e))?;

    let (width, height) = frame.dimensions();
    info!(path = %path.display(), width, height, seq = frame.seq, "snapshot saved");
    Ok(path.to_path_buf())
}

/// Export the frame if there is one.
pub fn export_latest(frame: Option<&Frame>, path: &Path) -> Result<PathBuf, SnapshotError> {
    export(frame.ok_or(SnapshotError::NoFrame)?, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("framelab-snapshot-{}-{name}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn png_round_trips_pixels() {
        let dir = scratch_dir("png");
        let path = dir.join("nested/shot.png");
        let mut frame = Frame::filled(6, 4, [10, 20, 30]);
        frame.image_mut().put_pixel(2, 1, image::Rgb([250, 0, 5]));

        let written = export(&frame, &path).unwrap();
        assert_eq!(written, path);
        let back = image::open(&path).unwrap().to_rgb8();
        assert_eq!(&back, frame.image());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn jpeg_and_bmp_are_accepted() {
        let dir = scratch_dir("lossy");
        let frame = Frame::filled(8, 8, [128, 128, 128]);
        for name in ["a.jpg", "b.JPEG", "c.bmp"] {
            let path = dir.join(name);
            export(&frame, &path).unwrap();
            assert_eq!(image::open(&path).unwrap().width(), 8);
        }
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let frame = Frame::filled(2, 2, [0, 0, 0]);
        let err = export(&frame, Path::new("out.gifv")).unwrap_err();
        assert!(matches!(err, SnapshotError::UnsupportedFormat(ext) if ext == "gifv"));
        assert!(matches!(
            export(&frame, Path::new("noext")).unwrap_err(),
            SnapshotError::UnsupportedFormat(_)
        ));
    }

    #[test]
    fn missing_frame_is_reported() {
        let err = export_latest(None, Path::new("x.png")).unwrap_err();
        assert!(matches!(err, SnapshotError::NoFrame));
    }
}
