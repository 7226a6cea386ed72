//! Headless Media Surface
//!
//! A wall-clock playhead over a probed media file. Frames are decoded on
//! demand by FFmpeg at the playhead position.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::local::{MediaSurface, SurfaceEvent, SurfaceOpener};
use super::{EncodedFrame, EVENT_CHANNEL_CAPACITY};
use crate::ffmpeg::{FFmpegRunner, MediaInfo};
use crate::types::{clamp_time, TimeSec};
use crate::{CoreError, CoreResult};

/// Time update cadence while playing
pub const DEFAULT_TIME_UPDATE_INTERVAL: Duration = Duration::from_millis(250);

// =============================================================================
// Playhead
// =============================================================================

/// Position tracker driven by the monotonic clock
#[derive(Clone, Debug)]
pub struct Playhead {
    duration: TimeSec,
    anchor: TimeSec,
    started_at: Option<Instant>,
}

impl Playhead {
    pub fn new(duration: TimeSec) -> Self {
        Self {
            duration: if duration.is_finite() { duration.max(0.0) } else { 0.0 },
            anchor: 0.0,
            started_at: None,
        }
    }

    pub fn duration(&self) -> TimeSec {
        self.duration
    }

    pub fn position(&self) -> TimeSec {
        match self.started_at {
            Some(started) => (self.anchor + started.elapsed().as_secs_f64()).min(self.duration),
            None => self.anchor,
        }
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn at_end(&self) -> bool {
        self.position() >= self.duration
    }

    /// Starts advancing. Starting at the end rewinds to zero first.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        if self.at_end() {
            self.anchor = 0.0;
        }
        self.started_at = Some(Instant::now());
    }

    /// Freezes the position and returns it
    pub fn stop(&mut self) -> TimeSec {
        self.anchor = self.position();
        self.started_at = None;
        self.anchor
    }

    /// Jumps to `to`, clamped into `[0, duration]`
    pub fn seek(&mut self, to: TimeSec) -> TimeSec {
        self.anchor = clamp_time(to, self.duration);
        if self.started_at.is_some() {
            self.started_at = Some(Instant::now());
        }
        self.anchor
    }
}

// =============================================================================
// FFmpeg Surface
// =============================================================================

struct SurfaceInner {
    path: PathBuf,
    runner: FFmpegRunner,
    media: MediaInfo,
    tick: Duration,
    playhead: Mutex<Playhead>,
    ticker: Mutex<Option<JoinHandle<()>>>,
    events: broadcast::Sender<SurfaceEvent>,
}

impl SurfaceInner {
    fn playhead(&self) -> std::sync::MutexGuard<'_, Playhead> {
        self.playhead.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SurfaceEvent) {
        let _ = self.events.send(event);
    }

    fn stop_ticker(&self) {
        if let Some(handle) = self
            .ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

/// Media surface backed by ffprobe metadata and ffmpeg frame decoding
#[derive(Clone)]
pub struct FfmpegSurface {
    inner: Arc<SurfaceInner>,
}

impl FfmpegSurface {
    pub fn new(path: PathBuf, runner: FFmpegRunner, media: MediaInfo, tick: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let playhead = Playhead::new(media.duration_sec);
        Self {
            inner: Arc::new(SurfaceInner {
                path,
                runner,
                media,
                tick: tick.max(Duration::from_millis(1)),
                playhead: Mutex::new(playhead),
                ticker: Mutex::new(None),
                events,
            }),
        }
    }
}

/// Emits periodic time updates until the end of media
async fn run_ticker(inner: Weak<SurfaceInner>, tick: Duration) {
    let mut interval = tokio::time::interval_at(Instant::now() + tick, tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        interval.tick().await;
        let Some(inner) = inner.upgrade() else {
            break;
        };

        let (position, ended) = {
            let mut playhead = inner.playhead();
            if playhead.at_end() {
                (playhead.stop(), true)
            } else {
                (playhead.position(), false)
            }
        };

        inner.emit(SurfaceEvent::TimeUpdate(position));
        if ended {
            debug!("Surface reached end of media at {:.3}s", position);
            inner.emit(SurfaceEvent::Ended);
            break;
        }
    }
}

#[async_trait]
impl MediaSurface for FfmpegSurface {
    fn duration(&self) -> TimeSec {
        self.inner.playhead().duration()
    }

    fn current_time(&self) -> TimeSec {
        self.inner.playhead().position()
    }

    fn is_paused(&self) -> bool {
        !self.inner.playhead().is_running()
    }

    async fn play(&self) -> CoreResult<()> {
        let mut ticker = self
            .inner
            .ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let running = ticker.as_ref().map(|h| !h.is_finished()).unwrap_or(false);
        self.inner.playhead().start();

        if !running {
            *ticker = Some(tokio::spawn(run_ticker(
                Arc::downgrade(&self.inner),
                self.inner.tick,
            )));
        }
        Ok(())
    }

    fn pause(&self) {
        self.inner.stop_ticker();
        let position = self.inner.playhead().stop();
        self.inner.emit(SurfaceEvent::TimeUpdate(position));
    }

    async fn seek(&self, to: TimeSec) -> CoreResult<()> {
        let position = self.inner.playhead().seek(to);
        self.inner.emit(SurfaceEvent::TimeUpdate(position));
        Ok(())
    }

    async fn capture_frame(&self, quality: f32) -> CoreResult<EncodedFrame> {
        if !self.inner.media.has_picture() {
            return Err(CoreError::FrameNotReady);
        }

        let position = self.current_time();
        let bytes = self
            .inner
            .runner
            .capture_jpeg(&self.inner.path, position, quality)
            .await
            .map_err(|e| CoreError::CaptureFailed(e.to_string()))?;

        Ok(EncodedFrame::jpeg(bytes))
    }

    fn subscribe(&self) -> broadcast::Receiver<SurfaceEvent> {
        self.inner.events.subscribe()
    }

    fn close(&self) {
        self.inner.stop_ticker();
        self.inner.playhead().stop();
    }
}

/// Opens [`FfmpegSurface`]s after probing the file
#[derive(Clone)]
pub struct FfmpegSurfaceOpener {
    runner: FFmpegRunner,
    tick: Duration,
}

impl FfmpegSurfaceOpener {
    pub fn new(runner: FFmpegRunner, tick: Duration) -> Self {
        Self { runner, tick }
    }
}

#[async_trait]
impl SurfaceOpener for FfmpegSurfaceOpener {
    async fn open(&self, path: &Path) -> CoreResult<Arc<dyn MediaSurface>> {
        if !path.is_file() {
            return Err(CoreError::FileNotFound(path.display().to_string()));
        }

        let media = self.runner.probe(path).await?;
        info!(
            "Probed {}: {:.3}s, format {}",
            path.display(),
            media.duration_sec,
            media.format
        );

        Ok(Arc::new(FfmpegSurface::new(
            path.to_path_buf(),
            self.runner.clone(),
            media,
            self.tick,
        )))
    }
}
