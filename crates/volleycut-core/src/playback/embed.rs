//! Embedded Player Playback
//!
//! Adapter over a third-party embedded player. The player API is loaded once
//! per host; the player exposes no progress events, so the adapter polls the
//! current time while playing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, OnceCell};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{
    PlaybackAdapter, PlaybackEvent, SourceKind, StopTarget, VideoSource, EVENT_CHANNEL_CAPACITY,
};
use crate::types::TimeSec;
use crate::{CoreError, CoreResult};

/// Poll cadence for the current time while playing
pub const EMBED_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Embedded player state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlayerState {
    Unstarted,
    Playing,
    Paused,
    Buffering,
    Ended,
}

/// Player variables passed at creation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedOptions {
    /// Show the player's own controls
    pub controls: bool,
    pub modest_branding: bool,
    /// Suggest related videos at the end
    pub related_videos: bool,
}

impl Default for EmbedOptions {
    fn default() -> Self {
        Self {
            controls: false,
            modest_branding: true,
            related_videos: false,
        }
    }
}

/// One embedded player instance
#[async_trait]
pub trait EmbeddedPlayer: Send + Sync {
    async fn play_video(&self) -> CoreResult<()>;

    async fn pause_video(&self) -> CoreResult<()>;

    async fn seek_to(&self, seconds: TimeSec, allow_seek_ahead: bool) -> CoreResult<()>;

    async fn current_time(&self) -> CoreResult<TimeSec>;

    async fn duration(&self) -> CoreResult<TimeSec>;

    async fn state(&self) -> CoreResult<PlayerState>;

    async fn destroy(&self);
}

/// Provides the player API and creates players
#[async_trait]
pub trait EmbedHost: Send + Sync {
    /// Loads the player API. Called at most once per host.
    async fn load_api(&self) -> CoreResult<()>;

    /// Creates a player for `video_id`; resolves once the player is ready.
    async fn create_player(
        &self,
        video_id: &str,
        options: &EmbedOptions,
    ) -> CoreResult<Arc<dyn EmbeddedPlayer>>;
}

/// Loads the host's player API exactly once and hands out players.
///
/// A failed load is retried on the next request.
pub struct EmbedApiLoader {
    host: Arc<dyn EmbedHost>,
    loaded: OnceCell<()>,
}

impl EmbedApiLoader {
    pub fn new(host: Arc<dyn EmbedHost>) -> Self {
        Self {
            host,
            loaded: OnceCell::new(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.initialized()
    }

    pub async fn ensure_loaded(&self) -> CoreResult<()> {
        self.loaded
            .get_or_try_init(|| async {
                info!("Loading embedded player API");
                self.host.load_api().await
            })
            .await?;
        Ok(())
    }

    pub async fn create_player(
        &self,
        video_id: &str,
        options: &EmbedOptions,
    ) -> CoreResult<Arc<dyn EmbeddedPlayer>> {
        self.ensure_loaded().await?;
        self.host.create_player(video_id, options).await
    }
}

/// Playback adapter for remote embedded videos
pub struct EmbedAdapter {
    loader: Arc<EmbedApiLoader>,
    options: EmbedOptions,
    player: Mutex<Option<Arc<dyn EmbeddedPlayer>>>,
    poll: Mutex<Option<JoinHandle<()>>>,
    playing: Arc<AtomicBool>,
    stop: StopTarget,
    events: broadcast::Sender<PlaybackEvent>,
}

impl EmbedAdapter {
    pub fn new(loader: Arc<EmbedApiLoader>) -> Self {
        Self::with_options(loader, EmbedOptions::default())
    }

    pub fn with_options(loader: Arc<EmbedApiLoader>, options: EmbedOptions) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            loader,
            options,
            player: Mutex::new(None),
            poll: Mutex::new(None),
            playing: Arc::new(AtomicBool::new(false)),
            stop: StopTarget::new(),
            events,
        }
    }

    fn player(&self) -> CoreResult<Arc<dyn EmbeddedPlayer>> {
        self.player
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(CoreError::NoSourceLoaded)
    }

    fn emit(&self, event: PlaybackEvent) {
        let _ = self.events.send(event);
    }

    fn start_poll(&self, player: Arc<dyn EmbeddedPlayer>) {
        let handle = tokio::spawn(poll_player(
            player,
            self.events.clone(),
            self.stop.clone(),
            Arc::clone(&self.playing),
        ));
        if let Some(previous) = self
            .poll
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle)
        {
            previous.abort();
        }
    }

    fn stop_poll(&self) {
        if let Some(handle) = self
            .poll
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }

    async fn release(&self) {
        self.stop_poll();
        self.stop.clear();
        self.playing.store(false, Ordering::SeqCst);
        let player = self
            .player
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(player) = player {
            player.destroy().await;
        }
    }
}

/// Polls the player while it plays. Stops on pause, end or clip end.
async fn poll_player(
    player: Arc<dyn EmbeddedPlayer>,
    events: broadcast::Sender<PlaybackEvent>,
    stop: StopTarget,
    playing: Arc<AtomicBool>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + EMBED_POLL_INTERVAL, EMBED_POLL_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let position = match player.current_time().await {
            Ok(position) => position,
            Err(e) => {
                warn!("Embedded player time poll failed: {}", e);
                continue;
            }
        };
        let _ = events.send(PlaybackEvent::TimeUpdate { position });

        if stop.reached(position).is_some() {
            if let Err(e) = player.pause_video().await {
                warn!("Failed to pause embedded player at clip end: {}", e);
            }
            playing.store(false, Ordering::SeqCst);
            let _ = events.send(PlaybackEvent::ClipEnded { at: position });
            let _ = events.send(PlaybackEvent::Paused);
            break;
        }

        match player.state().await {
            Ok(PlayerState::Ended) => {
                stop.clear();
                playing.store(false, Ordering::SeqCst);
                let _ = events.send(PlaybackEvent::Ended);
                let _ = events.send(PlaybackEvent::Paused);
                break;
            }
            Ok(PlayerState::Paused) => {
                playing.store(false, Ordering::SeqCst);
                let _ = events.send(PlaybackEvent::Paused);
                break;
            }
            Ok(_) => {}
            Err(e) => debug!("Embedded player state poll failed: {}", e),
        }
    }
}

#[async_trait]
impl PlaybackAdapter for EmbedAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::RemoteEmbed
    }

    async fn load(&self, source: &VideoSource) -> CoreResult<()> {
        let video_id = match source {
            VideoSource::RemoteEmbed { video_id } => video_id,
            other => {
                return Err(CoreError::UnsupportedSource(format!(
                    "{} cannot be played in the embedded player",
                    other
                )))
            }
        };

        self.release().await;

        let player = self.loader.create_player(video_id, &self.options).await?;
        let duration = player.duration().await.unwrap_or(0.0);
        *self.player.lock().unwrap_or_else(PoisonError::into_inner) = Some(player);

        info!("Loaded embedded video {} ({:.3}s)", video_id, duration);
        self.emit(PlaybackEvent::Ready { duration });
        Ok(())
    }

    async fn play(&self) -> CoreResult<()> {
        let player = self.player()?;
        player.play_video().await?;
        self.playing.store(true, Ordering::SeqCst);
        self.start_poll(player);
        self.emit(PlaybackEvent::Playing);
        Ok(())
    }

    async fn pause(&self) -> CoreResult<()> {
        let player = self.player()?;
        self.stop_poll();
        player.pause_video().await?;
        self.playing.store(false, Ordering::SeqCst);
        self.emit(PlaybackEvent::Paused);
        Ok(())
    }

    async fn seek(&self, to: TimeSec) -> CoreResult<()> {
        let player = self.player()?;
        player.seek_to(to, true).await?;
        let position = player.current_time().await.unwrap_or(to);
        self.emit(PlaybackEvent::TimeUpdate { position });
        Ok(())
    }

    async fn current_time(&self) -> TimeSec {
        match self.player() {
            Ok(player) => player.current_time().await.unwrap_or(0.0),
            Err(_) => 0.0,
        }
    }

    async fn duration(&self) -> TimeSec {
        match self.player() {
            Ok(player) => player.duration().await.unwrap_or(0.0),
            Err(_) => 0.0,
        }
    }

    async fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    async fn play_range(&self, start: TimeSec, end: TimeSec) -> CoreResult<()> {
        let player = self.player()?;
        player.seek_to(start, true).await?;
        self.stop.set(end);
        self.play().await
    }

    fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.events.subscribe()
    }

    async fn destroy(&self) {
        self.release().await;
        debug!("Embedded player adapter destroyed");
    }
}

impl Drop for EmbedAdapter {
    fn drop(&mut self) {
        if let Some(handle) = self
            .poll
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}
