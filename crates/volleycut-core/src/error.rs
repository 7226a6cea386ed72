//! VolleyCut Error Definitions
//!
//! Defines error types used throughout the project.

use thiserror::Error;

use crate::ffmpeg::FFmpegError;
use crate::types::{ClipId, TimeSec};

/// Core engine error types
#[derive(Error, Debug)]
pub enum CoreError {
    // =========================================================================
    // Source Errors
    // =========================================================================
    #[error("Invalid YouTube URL")]
    InvalidYouTubeUrl,

    #[error("Unsupported video source: {0}")]
    UnsupportedSource(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("No video loaded")]
    NoSourceLoaded,

    // =========================================================================
    // Playback Errors
    // =========================================================================
    #[error("Playback failed: {0}")]
    PlaybackFailed(String),

    #[error("Video not ready")]
    FrameNotReady,

    #[error("Frame capture failed: {0}")]
    CaptureFailed(String),

    #[error("Embedded player error: {0}")]
    EmbedFailed(String),

    // =========================================================================
    // Clip Errors
    // =========================================================================
    #[error("Clip not found: {0}")]
    ClipNotFound(ClipId),

    #[error("Invalid time range: {0}~{1} seconds")]
    InvalidTimeRange(TimeSec, TimeSec),

    // =========================================================================
    // Auto-tag Errors
    // =========================================================================
    #[error("AI request failed: {0}")]
    AIRequestFailed(String),

    #[error("API key required")]
    MissingCredential,

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    // =========================================================================
    // General Errors
    // =========================================================================
    #[error("{0}")]
    NotSupported(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("FFmpeg error: {0}")]
    FFmpeg(#[from] FFmpegError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Core engine result type
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Whether this error is informational rather than a failure
    /// (reported to the user as info, not as an error).
    pub fn is_informational(&self) -> bool {
        matches!(self, CoreError::NotSupported(_))
    }
}
