//! Transport Controller
//!
//! Owns the active playback adapter, the in/out marks, the active tag and the
//! clip list. Every user-facing outcome is reported through the [`Notifier`];
//! failures never leave the session unusable.

mod keymap;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, info, warn};

use crate::clips::{Clip, ClipStore};
use crate::labels::Label;
use crate::notify::Notifier;
use crate::playback::{AdapterFactory, PlaybackAdapter, PlaybackEvent, SourceKind, VideoSource};
use crate::types::{clamp_time, format_timecode, TimeSec};
use crate::{CoreError, CoreResult};

pub use keymap::{resolve, Key, KeyCommand, KeyContext, KeyInput, SEEK_STEP};

/// Transport state machine
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransportState {
    Unloaded,
    LoadedPaused,
    LoadedPlaying,
}

/// Observable playback state
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    pub source_kind: Option<SourceKind>,
    pub duration: TimeSec,
    pub current_position: TimeSec,
    pub is_playing: bool,
    pub mark_in: Option<TimeSec>,
    pub mark_out: Option<TimeSec>,
}

impl PlaybackState {
    /// Both marks set and out after in
    pub fn can_save(&self) -> bool {
        matches!((self.mark_in, self.mark_out), (Some(i), Some(o)) if o > i)
    }

    pub fn transport_state(&self) -> TransportState {
        match (self.source_kind, self.is_playing) {
            (None, _) => TransportState::Unloaded,
            (Some(_), false) => TransportState::LoadedPaused,
            (Some(_), true) => TransportState::LoadedPlaying,
        }
    }
}

pub struct Transport {
    factory: Arc<dyn AdapterFactory>,
    adapter: Option<Box<dyn PlaybackAdapter>>,
    events: Option<broadcast::Receiver<PlaybackEvent>>,
    source: Option<VideoSource>,
    state: PlaybackState,
    clips: ClipStore,
    active_tag: Label,
    notifier: Notifier,
}

impl Transport {
    pub fn new(factory: Arc<dyn AdapterFactory>, notifier: Notifier) -> Self {
        Self {
            factory,
            adapter: None,
            events: None,
            source: None,
            state: PlaybackState::default(),
            clips: ClipStore::new(),
            active_tag: Label::default(),
            notifier,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn transport_state(&self) -> TransportState {
        self.state.transport_state()
    }

    pub fn is_loaded(&self) -> bool {
        self.adapter.is_some()
    }

    pub fn source(&self) -> Option<&VideoSource> {
        self.source.as_ref()
    }

    pub fn adapter(&self) -> Option<&dyn PlaybackAdapter> {
        self.adapter.as_deref()
    }

    pub fn clips(&self) -> &ClipStore {
        &self.clips
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn active_tag(&self) -> Label {
        self.active_tag
    }

    pub fn set_active_tag(&mut self, tag: Label) {
        self.active_tag = tag;
    }

    /// Replaces one clip's tag
    pub fn set_clip_tag(&mut self, clip_id: &str, tag: Label) -> CoreResult<()> {
        self.clips.update_tag(clip_id, tag)
    }

    // =========================================================================
    // Source lifecycle
    // =========================================================================

    /// Loads a local file or YouTube link, replacing the current source.
    ///
    /// Invalid input leaves everything untouched. Otherwise the previous
    /// adapter is destroyed before the new one is created, and marks and
    /// clips are cleared.
    pub async fn load(&mut self, input: &str) -> CoreResult<()> {
        let source = match VideoSource::parse(input) {
            Ok(source) => source,
            Err(e) => {
                self.notifier.error(e.to_string());
                return Err(e);
            }
        };

        self.teardown().await;
        self.clear_session();

        match self.attach(&source).await {
            Ok(()) => {
                self.notifier.success(match source.kind() {
                    SourceKind::LocalFile => "Video loaded. Happy editing!",
                    SourceKind::RemoteEmbed => "YouTube video loaded.",
                });
                self.source = Some(source);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to load {}: {}", source, e);
                self.notifier.error(e.to_string());
                Err(e)
            }
        }
    }

    async fn attach(&mut self, source: &VideoSource) -> CoreResult<()> {
        let adapter = self.factory.create(source.kind())?;
        let events = adapter.subscribe();

        if let Err(e) = adapter.load(source).await {
            adapter.destroy().await;
            return Err(e);
        }

        self.state.source_kind = Some(source.kind());
        self.state.duration = adapter.duration().await;
        self.state.current_position = adapter.current_time().await;
        self.adapter = Some(adapter);
        self.events = Some(events);

        info!("Loaded {} ({:.3}s)", source, self.state.duration);
        Ok(())
    }

    /// Destroys the adapter and clears marks and clips
    pub async fn reset(&mut self) {
        self.teardown().await;
        self.clear_session();
        self.notifier.message("Session reset");
    }

    /// Destroys then drops the current adapter
    async fn teardown(&mut self) {
        self.events = None;
        if let Some(adapter) = self.adapter.take() {
            debug!("Destroying {} adapter", adapter.kind());
            adapter.destroy().await;
        }
    }

    fn clear_session(&mut self) {
        self.source = None;
        self.state = PlaybackState::default();
        self.clips.clear();
    }

    // =========================================================================
    // Playback
    // =========================================================================

    /// Live position from the adapter
    pub async fn current_time(&mut self) -> TimeSec {
        if let Some(adapter) = &self.adapter {
            self.state.current_position = adapter.current_time().await;
        }
        self.state.current_position
    }

    pub async fn play(&mut self) -> CoreResult<()> {
        let Some(adapter) = &self.adapter else {
            return Ok(());
        };
        adapter.play().await?;
        self.state.is_playing = true;
        Ok(())
    }

    pub async fn pause(&mut self) -> CoreResult<()> {
        let Some(adapter) = &self.adapter else {
            return Ok(());
        };
        adapter.pause().await?;
        self.state.is_playing = false;
        Ok(())
    }

    pub async fn toggle_play(&mut self) -> CoreResult<()> {
        if self.state.is_playing {
            self.pause().await
        } else {
            self.play().await
        }
    }

    /// Seeks by `delta` seconds, clamped into `[0, duration]`
    pub async fn seek_relative(&mut self, delta: TimeSec) -> CoreResult<()> {
        if self.adapter.is_none() {
            return Ok(());
        }
        let from = self.current_time().await;
        self.seek_to(from + delta).await
    }

    /// Seeks to `to`, clamped into `[0, duration]`.
    ///
    /// A zero duration is re-read from the adapter first; embedded players
    /// report 0 until their metadata arrives.
    pub async fn seek_to(&mut self, to: TimeSec) -> CoreResult<()> {
        let Some(adapter) = &self.adapter else {
            return Ok(());
        };
        if self.state.duration <= 0.0 {
            self.state.duration = adapter.duration().await;
        }
        let target = clamp_time(to, self.state.duration);
        adapter.seek(target).await?;
        self.state.current_position = target;
        Ok(())
    }

    /// Plays a saved clip, stopping at or after its end
    pub async fn play_clip(&mut self, clip_id: &str) -> CoreResult<()> {
        let Some(adapter) = &self.adapter else {
            return Ok(());
        };
        let clip = self
            .clips
            .get(clip_id)
            .ok_or_else(|| CoreError::ClipNotFound(clip_id.to_string()))?;

        adapter.play_range(clip.start, clip.end).await?;
        self.state.current_position = clip.start;
        self.state.is_playing = true;
        Ok(())
    }

    // =========================================================================
    // Marks and clips
    // =========================================================================

    pub async fn mark_in(&mut self) {
        if self.adapter.is_some() {
            let at = self.current_time().await;
            self.set_mark_in(at);
        }
    }

    pub async fn mark_out(&mut self) {
        if self.adapter.is_some() {
            let at = self.current_time().await;
            self.set_mark_out(at);
        }
    }

    fn set_mark_in(&mut self, at: TimeSec) {
        if self.adapter.is_some() {
            self.state.mark_in = Some(at);
        }
    }

    fn set_mark_out(&mut self, at: TimeSec) {
        if self.adapter.is_some() {
            self.state.mark_out = Some(at);
        }
    }

    /// Saves the marked range as a clip at the top of the list.
    ///
    /// No-op unless both marks are set with out after in. Marks are kept.
    pub fn save_clip(&mut self, tag: Label) -> Option<Clip> {
        if self.adapter.is_none() || !self.state.can_save() {
            return None;
        }
        let (Some(start), Some(end)) = (self.state.mark_in, self.state.mark_out) else {
            return None;
        };

        let clip = match Clip::new(start, end, tag) {
            Ok(clip) => clip,
            Err(e) => {
                self.notifier.error(e.to_string());
                return None;
            }
        };

        self.notifier.success(format!(
            "Saved clip {} → {} ({})",
            format_timecode(clip.start),
            format_timecode(clip.end),
            clip.tag
        ));
        self.clips.add(clip.clone());
        Some(clip)
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Mirrors an adapter event into the playback state
    pub fn apply_event(&mut self, event: &PlaybackEvent) {
        match event {
            PlaybackEvent::Ready { duration } => {
                if *duration > 0.0 {
                    self.state.duration = *duration;
                }
            }
            PlaybackEvent::TimeUpdate { position } => self.state.current_position = *position,
            PlaybackEvent::Playing => self.state.is_playing = true,
            PlaybackEvent::Paused | PlaybackEvent::Ended => self.state.is_playing = false,
            PlaybackEvent::ClipEnded { at } => {
                self.state.current_position = *at;
                self.state.is_playing = false;
            }
        }
    }

    /// Waits for the next adapter event and applies it.
    ///
    /// Pending forever while nothing is loaded.
    pub async fn next_event(&mut self) -> PlaybackEvent {
        loop {
            let Some(events) = self.events.as_mut() else {
                return std::future::pending().await;
            };
            let received = events.recv().await;
            match received {
                Ok(event) => {
                    self.apply_event(&event);
                    return event;
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Transport lagged by {} playback events", skipped);
                }
                Err(RecvError::Closed) => {
                    self.events = None;
                }
            }
        }
    }

    /// Applies every event already queued
    pub fn drain_events(&mut self) -> usize {
        let mut applied = 0;
        while let Some(events) = self.events.as_mut() {
            match events.try_recv() {
                Ok(event) => {
                    self.apply_event(&event);
                    applied += 1;
                }
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Closed) => self.events = None,
            }
        }
        applied
    }

    // =========================================================================
    // Keyboard
    // =========================================================================

    /// Dispatches a key press against a fresh state snapshot
    pub async fn handle_key(&mut self, input: &KeyInput) -> CoreResult<()> {
        let ctx = KeyContext {
            position: self.current_time().await,
            active_tag: self.active_tag,
        };

        match resolve(input, &ctx) {
            Some(command) => self.execute(command).await,
            None => Ok(()),
        }
    }

    pub async fn execute(&mut self, command: KeyCommand) -> CoreResult<()> {
        match command {
            KeyCommand::TogglePlay => self.toggle_play().await,
            KeyCommand::MarkIn(at) => {
                self.set_mark_in(at);
                Ok(())
            }
            KeyCommand::MarkOut(at) => {
                self.set_mark_out(at);
                Ok(())
            }
            KeyCommand::SaveClip(tag) => {
                self.save_clip(tag);
                Ok(())
            }
            KeyCommand::SeekRelative(delta) => self.seek_relative(delta).await,
            KeyCommand::SelectTag(tag) => {
                self.active_tag = tag;
                Ok(())
            }
        }
    }
}
