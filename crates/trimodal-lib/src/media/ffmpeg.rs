//! Synchronous ffmpeg/ffprobe CLI wrapper implementing [`VideoDecoder`].
//!
//! Frame dimensions come from an ffprobe JSON probe; the pixel data is read
//! as raw `rgb24` from an ffmpeg pipe and reshaped into `(frames, height,
//! width, 3)`.

use std::path::{Path, PathBuf};
use std::process::Command;

use ndarray::Array4;
use tracing::debug;

use crate::error::{DatasetError, Result};
use crate::media::{VideoDecoder, VideoTensor};

/// Video decoder backed by the ffmpeg command-line tools.
pub struct FfmpegDecoder {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegDecoder {
    /// Locate `ffmpeg` and `ffprobe` in PATH.
    pub fn discover() -> Result<Self> {
        let ffmpeg = which::which("ffmpeg").map_err(|_| DatasetError::FfmpegNotFound)?;
        let ffprobe = which::which("ffprobe").map_err(|_| DatasetError::FfprobeNotFound)?;
        Ok(FfmpegDecoder { ffmpeg, ffprobe })
    }

    /// Use explicit binary paths (e.g. bundled builds).
    pub fn with_binaries(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        FfmpegDecoder {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Probe `(width, height)` of the first video stream.
    fn probe_dimensions(&self, path: &Path) -> Result<(usize, usize)> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height",
                "-of",
                "json",
            ])
            .arg(path)
            .output()
            .map_err(|e| DatasetError::video_decode(path, format!("failed to run ffprobe: {e}")))?;

        if !output.status.success() {
            return Err(DatasetError::video_decode(
                path,
                format!(
                    "ffprobe exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }

        let probe: serde_json::Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| DatasetError::video_decode(path, format!("bad ffprobe JSON: {e}")))?;
        let stream = probe
            .get("streams")
            .and_then(|s| s.get(0))
            .ok_or_else(|| DatasetError::video_decode(path, "no video stream found"))?;
        let width = stream.get("width").and_then(|v| v.as_u64());
        let height = stream.get("height").and_then(|v| v.as_u64());
        match (width, height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Ok((w as usize, h as usize)),
            _ => Err(DatasetError::video_decode(
                path,
                "stream is missing width/height",
            )),
        }
    }
}

impl VideoDecoder for FfmpegDecoder {
    fn decode(&self, path: &Path) -> Result<VideoTensor> {
        if !path.exists() {
            return Err(DatasetError::video_decode(path, "no such file"));
        }

        let (width, height) = self.probe_dimensions(path)?;

        let output = Command::new(&self.ffmpeg)
            .args(["-v", "error", "-i"])
            .arg(path)
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"])
            .output()
            .map_err(|e| DatasetError::video_decode(path, format!("failed to run ffmpeg: {e}")))?;

        if !output.status.success() {
            return Err(DatasetError::video_decode(
                path,
                format!(
                    "ffmpeg exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }

        let frame_bytes = width * height * 3;
        if frame_bytes == 0 || output.stdout.len() % frame_bytes != 0 {
            return Err(DatasetError::video_decode(
                path,
                format!(
                    "raw stream length {} is not a multiple of frame size {}",
                    output.stdout.len(),
                    frame_bytes
                ),
            ));
        }

        let frames = output.stdout.len() / frame_bytes;
        debug!(
            path = %path.display(),
            frames, width, height, "decoded video"
        );

        Array4::from_shape_vec((frames, height, width, 3), output.stdout)
            .map_err(|e| DatasetError::video_decode(path, format!("reshape failed: {e}")))
    }
}
