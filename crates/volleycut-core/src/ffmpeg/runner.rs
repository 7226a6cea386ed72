//! FFmpeg Runner Module
//!
//! Executes FFprobe/FFmpeg for media probing and frame capture.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{FFmpegError, FFmpegInfo, FFmpegResult};

/// Media information extracted by FFprobe
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaInfo {
    /// Duration in seconds
    pub duration_sec: f64,
    /// Video stream info (if present)
    pub video: Option<VideoStreamInfo>,
    /// Audio stream info (if present)
    pub audio: Option<AudioStreamInfo>,
    /// Container format
    pub format: String,
    /// File size in bytes
    pub size_bytes: u64,
}

impl MediaInfo {
    /// Whether the media has a video stream with known dimensions
    pub fn has_picture(&self) -> bool {
        self.video
            .as_ref()
            .map(|v| v.width > 0 && v.height > 0)
            .unwrap_or(false)
    }
}

/// Video stream information
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoStreamInfo {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Frame rate (frames per second)
    pub fps: f64,
    /// Codec name (e.g., "h264", "vp9")
    pub codec: String,
}

/// Audio stream information
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioStreamInfo {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u8,
    /// Codec name (e.g., "aac", "mp3")
    pub codec: String,
}

/// Maps a 0.0-1.0 image quality onto FFmpeg's MJPEG `-q:v` scale
/// (2 = best, 31 = worst).
pub fn jpeg_qscale(quality: f32) -> u8 {
    let quality = if quality.is_finite() {
        quality.clamp(0.0, 1.0)
    } else {
        1.0
    };
    (2.0 + (1.0 - quality) * 29.0).round() as u8
}

/// FFmpeg Runner for probing and frame capture
#[derive(Clone)]
pub struct FFmpegRunner {
    info: Arc<FFmpegInfo>,
}

impl FFmpegRunner {
    /// Create a new FFmpegRunner from a detected FFmpeg installation
    pub fn new(info: FFmpegInfo) -> Self {
        Self {
            info: Arc::new(info),
        }
    }

    /// Capture a single frame as JPEG bytes
    ///
    /// # Arguments
    /// * `input` - Path to the input video file
    /// * `time_sec` - Time position in seconds
    /// * `quality` - JPEG quality between 0.0 and 1.0
    pub async fn capture_jpeg(
        &self,
        input: &Path,
        time_sec: f64,
        quality: f32,
    ) -> FFmpegResult<Vec<u8>> {
        if !input.exists() {
            return Err(FFmpegError::InvalidInput(format!(
                "Input file does not exist: {}",
                input.display()
            )));
        }

        // -ss before -i for fast seeking, single MJPEG frame to stdout
        let output = tokio::process::Command::new(&self.info.ffmpeg_path)
            .args([
                "-v",
                "error",
                "-ss",
                &format!("{:.3}", time_sec.max(0.0)),
                "-i",
                &input.to_string_lossy(),
                "-frames:v",
                "1",
                "-q:v",
                &jpeg_qscale(quality).to_string(),
                "-f",
                "image2pipe",
                "-vcodec",
                "mjpeg",
                "-",
            ])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(FFmpegError::ProcessError)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FFmpegError::ExecutionFailed(format!(
                "Frame capture failed: {}",
                stderr.trim()
            )));
        }

        if output.stdout.is_empty() {
            return Err(FFmpegError::ExecutionFailed(format!(
                "No frame decoded at {:.3}s",
                time_sec
            )));
        }

        Ok(output.stdout)
    }

    /// Probe a media file with FFprobe
    pub async fn probe(&self, input: &Path) -> FFmpegResult<MediaInfo> {
        if !input.exists() {
            return Err(FFmpegError::InvalidInput(format!(
                "Input file does not exist: {}",
                input.display()
            )));
        }

        let output = tokio::process::Command::new(&self.info.ffprobe_path)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
                &input.to_string_lossy(),
            ])
            .output()
            .await
            .map_err(FFmpegError::ProcessError)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FFmpegError::ProbeError(format!("FFprobe failed: {}", stderr)));
        }

        parse_probe_output(&String::from_utf8_lossy(&output.stdout))
    }
}

fn parse_probe_output(json_str: &str) -> FFmpegResult<MediaInfo> {
    let json: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| FFmpegError::ParseError(format!("Failed to parse FFprobe output: {}", e)))?;

    let format = json
        .get("format")
        .ok_or_else(|| FFmpegError::ParseError("Missing format info".to_string()))?;

    let duration_sec = format
        .get("duration")
        .and_then(|d| d.as_str())
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .unwrap_or(0.0);

    let size_bytes = format
        .get("size")
        .and_then(|s| s.as_str())
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    let format_name = format
        .get("format_name")
        .and_then(|f| f.as_str())
        .unwrap_or("unknown")
        .to_string();

    let streams = json
        .get("streams")
        .and_then(|s| s.as_array())
        .cloned()
        .unwrap_or_default();

    let mut video_info: Option<VideoStreamInfo> = None;
    let mut audio_info: Option<AudioStreamInfo> = None;

    for stream in streams {
        match stream.get("codec_type").and_then(|c| c.as_str()) {
            Some("video") if video_info.is_none() => {
                video_info = Some(parse_video_stream(&stream));
            }
            Some("audio") if audio_info.is_none() => {
                audio_info = Some(parse_audio_stream(&stream));
            }
            _ => {}
        }
    }

    Ok(MediaInfo {
        duration_sec,
        video: video_info,
        audio: audio_info,
        format: format_name,
        size_bytes,
    })
}

fn parse_video_stream(stream: &serde_json::Value) -> VideoStreamInfo {
    let width = stream.get("width").and_then(|w| w.as_u64()).unwrap_or(0) as u32;
    let height = stream.get("height").and_then(|h| h.as_u64()).unwrap_or(0) as u32;

    // r_frame_rate looks like "30/1" or "30000/1001"
    let fps = stream
        .get("r_frame_rate")
        .and_then(|f| f.as_str())
        .and_then(|s| match s.split_once('/') {
            Some((num, den)) => {
                let num: f64 = num.parse().ok()?;
                let den: f64 = den.parse().ok()?;
                (den > 0.0).then(|| num / den)
            }
            None => s.parse().ok(),
        })
        .unwrap_or(30.0);

    let codec = stream
        .get("codec_name")
        .and_then(|c| c.as_str())
        .unwrap_or("unknown")
        .to_string();

    VideoStreamInfo {
        width,
        height,
        fps,
        codec,
    }
}

fn parse_audio_stream(stream: &serde_json::Value) -> AudioStreamInfo {
    let sample_rate = stream
        .get("sample_rate")
        .and_then(|s| s.as_str())
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(44100);

    let channels = stream.get("channels").and_then(|c| c.as_u64()).unwrap_or(2) as u8;

    let codec = stream
        .get("codec_name")
        .and_then(|c| c.as_str())
        .unwrap_or("unknown")
        .to_string();

    AudioStreamInfo {
        sample_rate,
        channels,
        codec,
    }
}
