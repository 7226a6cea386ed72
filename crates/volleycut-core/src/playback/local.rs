//! Local File Playback
//!
//! Adapter over a native media surface. Time updates are pushed by the
//! surface, so clip-bounded stops are checked on each surface event.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{
    EncodedFrame, FrameGrabber, PlaybackAdapter, PlaybackEvent, SourceKind, StopTarget,
    VideoSource, EVENT_CHANNEL_CAPACITY,
};
use crate::types::TimeSec;
use crate::{CoreError, CoreResult};

/// Events fired by a media surface
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SurfaceEvent {
    /// Playback progressed, paused or finished seeking
    TimeUpdate(TimeSec),
    /// Reached the end of media
    Ended,
}

/// A rendered, seekable media surface
#[async_trait]
pub trait MediaSurface: Send + Sync {
    fn duration(&self) -> TimeSec;

    fn current_time(&self) -> TimeSec;

    fn is_paused(&self) -> bool;

    async fn play(&self) -> CoreResult<()>;

    fn pause(&self);

    /// Resolves once the surface has settled on the new position.
    async fn seek(&self, to: TimeSec) -> CoreResult<()>;

    /// Encodes the currently displayed frame as JPEG
    async fn capture_frame(&self, quality: f32) -> CoreResult<EncodedFrame>;

    fn subscribe(&self) -> broadcast::Receiver<SurfaceEvent>;

    /// Stops playback and releases the surface
    fn close(&self);
}

/// Opens media surfaces for local files
#[async_trait]
pub trait SurfaceOpener: Send + Sync {
    async fn open(&self, path: &Path) -> CoreResult<Arc<dyn MediaSurface>>;
}

/// Playback adapter for local video files
pub struct LocalFileAdapter {
    opener: Arc<dyn SurfaceOpener>,
    surface: Mutex<Option<Arc<dyn MediaSurface>>>,
    listener: Mutex<Option<JoinHandle<()>>>,
    stop: StopTarget,
    events: broadcast::Sender<PlaybackEvent>,
}

impl LocalFileAdapter {
    pub fn new(opener: Arc<dyn SurfaceOpener>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            opener,
            surface: Mutex::new(None),
            listener: Mutex::new(None),
            stop: StopTarget::new(),
            events,
        }
    }

    fn surface(&self) -> CoreResult<Arc<dyn MediaSurface>> {
        self.surface
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(CoreError::NoSourceLoaded)
    }

    fn emit(&self, event: PlaybackEvent) {
        let _ = self.events.send(event);
    }

    /// Closes the current surface and stops forwarding its events
    fn release(&self) {
        if let Some(handle) = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
        if let Some(surface) = self
            .surface
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            surface.close();
        }
        self.stop.clear();
    }
}

/// Mirrors surface events as playback events and enforces the clip stop.
async fn forward_surface_events(
    surface: Arc<dyn MediaSurface>,
    mut rx: broadcast::Receiver<SurfaceEvent>,
    events: broadcast::Sender<PlaybackEvent>,
    stop: StopTarget,
) {
    loop {
        match rx.recv().await {
            Ok(SurfaceEvent::TimeUpdate(position)) => {
                let _ = events.send(PlaybackEvent::TimeUpdate { position });
                // Queued updates may predate a seek; check the live position.
                let now = surface.current_time();
                if let Some(target) = stop.reached(now) {
                    debug!("Clip end {:.3}s reached at {:.3}s", target, now);
                    surface.pause();
                    let _ = events.send(PlaybackEvent::ClipEnded { at: now });
                    let _ = events.send(PlaybackEvent::Paused);
                }
            }
            Ok(SurfaceEvent::Ended) => {
                stop.clear();
                let _ = events.send(PlaybackEvent::Ended);
                let _ = events.send(PlaybackEvent::Paused);
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("Surface event listener lagged by {} events", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
}

#[async_trait]
impl PlaybackAdapter for LocalFileAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::LocalFile
    }

    async fn load(&self, source: &VideoSource) -> CoreResult<()> {
        let path = match source {
            VideoSource::LocalFile(path) => path,
            other => {
                return Err(CoreError::UnsupportedSource(format!(
                    "{} cannot be played as a local file",
                    other
                )))
            }
        };

        self.release();

        let surface = self.opener.open(path).await?;
        let duration = surface.duration();

        let handle = tokio::spawn(forward_surface_events(
            Arc::clone(&surface),
            surface.subscribe(),
            self.events.clone(),
            self.stop.clone(),
        ));

        *self.listener.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        *self.surface.lock().unwrap_or_else(PoisonError::into_inner) = Some(surface);

        info!("Loaded local file {} ({:.3}s)", path.display(), duration);
        self.emit(PlaybackEvent::Ready { duration });
        Ok(())
    }

    async fn play(&self) -> CoreResult<()> {
        self.surface()?.play().await?;
        self.emit(PlaybackEvent::Playing);
        Ok(())
    }

    async fn pause(&self) -> CoreResult<()> {
        self.surface()?.pause();
        self.emit(PlaybackEvent::Paused);
        Ok(())
    }

    async fn seek(&self, to: TimeSec) -> CoreResult<()> {
        self.surface()?.seek(to).await
    }

    async fn current_time(&self) -> TimeSec {
        self.surface().map(|s| s.current_time()).unwrap_or(0.0)
    }

    async fn duration(&self) -> TimeSec {
        self.surface().map(|s| s.duration()).unwrap_or(0.0)
    }

    async fn is_playing(&self) -> bool {
        self.surface().map(|s| !s.is_paused()).unwrap_or(false)
    }

    async fn play_range(&self, start: TimeSec, end: TimeSec) -> CoreResult<()> {
        let surface = self.surface()?;
        surface.seek(start).await?;
        self.stop.set(end);
        surface.play().await?;
        self.emit(PlaybackEvent::Playing);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.events.subscribe()
    }

    fn frame_grabber(&self) -> Option<&dyn FrameGrabber> {
        Some(self)
    }

    async fn destroy(&self) {
        self.release();
        debug!("Local file adapter destroyed");
    }
}

#[async_trait]
impl FrameGrabber for LocalFileAdapter {
    async fn grab_frame(&self, quality: f32) -> CoreResult<EncodedFrame> {
        self.surface()?.capture_frame(quality).await
    }
}

impl Drop for LocalFileAdapter {
    fn drop(&mut self) {
        if let Some(handle) = self
            .listener
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}
