//! Playback Module
//!
//! One playback interface over two backends:
//! - a local media surface (event-driven time updates, frame capture)
//! - an embedded third-party player (polled time updates, no frame access)
//!
//! Callers only ever talk to [`PlaybackAdapter`]; the backend is picked by
//! [`SourceKind`] through an [`AdapterFactory`].

mod backends;
mod embed;
mod local;
#[cfg(unix)]
mod mpv;
mod source;
mod surface;

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::TimeSec;
use crate::CoreResult;

pub use backends::{AdapterFactory, Backends};
pub use embed::{
    EmbedAdapter, EmbedApiLoader, EmbedHost, EmbedOptions, EmbeddedPlayer, PlayerState,
    EMBED_POLL_INTERVAL,
};
pub use local::{LocalFileAdapter, MediaSurface, SurfaceEvent, SurfaceOpener};
#[cfg(unix)]
pub use mpv::MpvHost;
pub use source::{parse_youtube_id, watch_url, SourceKind, VideoSource};
pub use surface::{FfmpegSurface, FfmpegSurfaceOpener, Playhead, DEFAULT_TIME_UPDATE_INTERVAL};

/// Playback event capacity before slow subscribers start lagging
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 256;

// =============================================================================
// Events
// =============================================================================

/// Events emitted by a playback adapter
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum PlaybackEvent {
    /// Source loaded and ready to play
    Ready { duration: TimeSec },
    /// Current position changed
    TimeUpdate { position: TimeSec },
    Playing,
    Paused,
    /// Playback reached the end of the media
    Ended,
    /// Clip-bounded playback stopped at or after the clip end
    ClipEnded { at: TimeSec },
}

// =============================================================================
// Frames
// =============================================================================

/// An encoded still frame
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedFrame {
    /// MIME type, e.g. `image/jpeg`
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl EncodedFrame {
    pub fn jpeg(bytes: Vec<u8>) -> Self {
        Self {
            mime: "image/jpeg".to_string(),
            bytes,
        }
    }

    /// Base64 payload without the data-URL prefix
    pub fn base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }

    /// `data:<mime>;base64,<payload>`
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, self.base64())
    }
}

/// Access to the currently rendered picture
#[async_trait]
pub trait FrameGrabber: Send + Sync {
    /// Encodes the frame at the current position as JPEG.
    ///
    /// `quality` is between 0.0 and 1.0.
    async fn grab_frame(&self, quality: f32) -> CoreResult<EncodedFrame>;
}

// =============================================================================
// Playback Adapter
// =============================================================================

/// Uniform playback control over any backend
#[async_trait]
pub trait PlaybackAdapter: Send + Sync {
    /// Backend kind
    fn kind(&self) -> SourceKind;

    /// Loads a source. Resolves once the media is ready to play.
    async fn load(&self, source: &VideoSource) -> CoreResult<()>;

    async fn play(&self) -> CoreResult<()>;

    async fn pause(&self) -> CoreResult<()>;

    /// Seeks to an absolute position. Resolves once the seek has completed.
    async fn seek(&self, to: TimeSec) -> CoreResult<()>;

    async fn current_time(&self) -> TimeSec;

    async fn duration(&self) -> TimeSec;

    async fn is_playing(&self) -> bool;

    /// Plays from `start` and pauses at the first time update at or after `end`.
    async fn play_range(&self, start: TimeSec, end: TimeSec) -> CoreResult<()>;

    /// Subscribes to playback events
    fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent>;

    /// Frame access, available only on backends with pixel access
    fn frame_grabber(&self) -> Option<&dyn FrameGrabber> {
        None
    }

    /// Releases the backend. The adapter must not be used afterwards.
    async fn destroy(&self);
}

// =============================================================================
// Clip-bounded stop
// =============================================================================

/// Pending stop time for clip-bounded playback.
///
/// Shared between an adapter and its event/poll task.
#[derive(Clone, Debug, Default)]
pub struct StopTarget {
    inner: Arc<Mutex<Option<TimeSec>>>,
}

impl StopTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, end: TimeSec) {
        *self.lock() = Some(end);
    }

    pub fn clear(&self) {
        *self.lock() = None;
    }

    pub fn get(&self) -> Option<TimeSec> {
        *self.lock()
    }

    /// Takes the target when `position` has reached it.
    ///
    /// Never fires before the target, so the stop lands at or after it.
    pub fn reached(&self, position: TimeSec) -> Option<TimeSec> {
        let mut guard = self.lock();
        match *guard {
            Some(target) if position >= target => guard.take(),
            _ => None,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<TimeSec>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
pub(crate) mod testing;
