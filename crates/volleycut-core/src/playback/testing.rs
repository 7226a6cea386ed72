//! In-crate fakes for the surface and embedded player seams.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::embed::{EmbedHost, EmbedOptions, EmbeddedPlayer, PlayerState};
use super::local::{MediaSurface, SurfaceEvent, SurfaceOpener};
use super::{EncodedFrame, PlaybackEvent};
use crate::types::{clamp_time, TimeSec};
use crate::{CoreError, CoreResult};

/// Shared, ordered record of backend lifecycle calls
pub(crate) type Journal = Arc<Mutex<Vec<String>>>;

fn record(journal: &Option<Journal>, entry: &str) {
    if let Some(journal) = journal {
        journal.lock().unwrap().push(entry.to_string());
    }
}

/// Waits for the first event matching `pred`, skipping others.
pub(crate) async fn next_matching(
    rx: &mut broadcast::Receiver<PlaybackEvent>,
    pred: impl Fn(&PlaybackEvent) -> bool,
) -> PlaybackEvent {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let event = rx.recv().await.expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for playback event")
}

// =============================================================================
// Surface
// =============================================================================

pub(crate) struct FakeSurface {
    duration: TimeSec,
    has_picture: bool,
    position: Mutex<TimeSec>,
    paused: AtomicBool,
    closed: AtomicBool,
    captures: Mutex<Vec<TimeSec>>,
    fail_capture_at: Mutex<Option<usize>>,
    events: broadcast::Sender<SurfaceEvent>,
    journal: Option<Journal>,
}

impl FakeSurface {
    fn new(duration: TimeSec, has_picture: bool, journal: Option<Journal>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            duration,
            has_picture,
            position: Mutex::new(0.0),
            paused: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            captures: Mutex::new(Vec::new()),
            fail_capture_at: Mutex::new(None),
            events,
            journal,
        }
    }

    /// Simulates playback progress
    pub(crate) fn advance_to(&self, position: TimeSec) {
        *self.position.lock().unwrap() = position;
        let _ = self.events.send(SurfaceEvent::TimeUpdate(position));
    }

    /// Simulates reaching the end of media
    pub(crate) fn finish(&self) {
        *self.position.lock().unwrap() = self.duration;
        self.paused.store(true, Ordering::SeqCst);
        let _ = self.events.send(SurfaceEvent::TimeUpdate(self.duration));
        let _ = self.events.send(SurfaceEvent::Ended);
    }

    /// Fails the next capture attempted after `n` successful ones
    pub(crate) fn fail_capture_at(&self, n: usize) {
        *self.fail_capture_at.lock().unwrap() = Some(n);
    }

    pub(crate) fn captures(&self) -> Vec<TimeSec> {
        self.captures.lock().unwrap().clone()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaSurface for FakeSurface {
    fn duration(&self) -> TimeSec {
        self.duration
    }

    fn current_time(&self) -> TimeSec {
        *self.position.lock().unwrap()
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    async fn play(&self) -> CoreResult<()> {
        let mut position = self.position.lock().unwrap();
        if *position >= self.duration {
            *position = 0.0;
        }
        self.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        let position = self.current_time();
        let _ = self.events.send(SurfaceEvent::TimeUpdate(position));
    }

    async fn seek(&self, to: TimeSec) -> CoreResult<()> {
        let position = clamp_time(to, self.duration);
        *self.position.lock().unwrap() = position;
        let _ = self.events.send(SurfaceEvent::TimeUpdate(position));
        Ok(())
    }

    async fn capture_frame(&self, _quality: f32) -> CoreResult<EncodedFrame> {
        if !self.has_picture {
            return Err(CoreError::FrameNotReady);
        }
        let position = self.current_time();
        let mut captures = self.captures.lock().unwrap();
        let mut fail_at = self.fail_capture_at.lock().unwrap();
        if *fail_at == Some(captures.len()) {
            *fail_at = None;
            return Err(CoreError::CaptureFailed("decoder error".to_string()));
        }
        captures.push(position);
        Ok(EncodedFrame::jpeg(format!("frame@{:.3}", position).into_bytes()))
    }

    fn subscribe(&self) -> broadcast::Receiver<SurfaceEvent> {
        self.events.subscribe()
    }

    fn close(&self) {
        self.paused.store(true, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        record(&self.journal, "surface closed");
    }
}

pub(crate) struct FakeSurfaceOpener {
    duration: TimeSec,
    has_picture: AtomicBool,
    failing: AtomicBool,
    surfaces: Mutex<Vec<Arc<FakeSurface>>>,
    journal: Option<Journal>,
}

impl FakeSurfaceOpener {
    pub(crate) fn new(duration: TimeSec) -> Arc<Self> {
        Self::build(duration, None)
    }

    pub(crate) fn with_journal(duration: TimeSec, journal: Journal) -> Arc<Self> {
        Self::build(duration, Some(journal))
    }

    fn build(duration: TimeSec, journal: Option<Journal>) -> Arc<Self> {
        Arc::new(Self {
            duration,
            has_picture: AtomicBool::new(true),
            failing: AtomicBool::new(false),
            surfaces: Mutex::new(Vec::new()),
            journal,
        })
    }

    /// Surfaces opened from now on have no video dimensions
    pub(crate) fn without_picture(&self) {
        self.has_picture.store(false, Ordering::SeqCst);
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub(crate) fn last(&self) -> Option<Arc<FakeSurface>> {
        self.surfaces.lock().unwrap().last().cloned()
    }

    pub(crate) fn opened(&self) -> usize {
        self.surfaces.lock().unwrap().len()
    }
}

#[async_trait]
impl SurfaceOpener for FakeSurfaceOpener {
    async fn open(&self, path: &Path) -> CoreResult<Arc<dyn MediaSurface>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CoreError::PlaybackFailed(format!(
                "cannot decode {}",
                path.display()
            )));
        }
        let surface = Arc::new(FakeSurface::new(
            self.duration,
            self.has_picture.load(Ordering::SeqCst),
            self.journal.clone(),
        ));
        self.surfaces.lock().unwrap().push(Arc::clone(&surface));
        record(&self.journal, "surface opened");
        Ok(surface)
    }
}

// =============================================================================
// Embedded player
// =============================================================================

pub(crate) struct FakeEmbeddedPlayer {
    duration: TimeSec,
    /// Duration reads still answered with 0 before metadata arrives
    pending_duration_reads: AtomicUsize,
    position: Mutex<TimeSec>,
    state: Mutex<PlayerState>,
    destroyed: AtomicBool,
    journal: Option<Journal>,
}

impl FakeEmbeddedPlayer {
    pub(crate) fn set_position(&self, position: TimeSec) {
        *self.position.lock().unwrap() = position;
    }

    pub(crate) fn set_state(&self, state: PlayerState) {
        *self.state.lock().unwrap() = state;
    }

    pub(crate) fn position(&self) -> TimeSec {
        *self.position.lock().unwrap()
    }

    pub(crate) fn state_now(&self) -> PlayerState {
        *self.state.lock().unwrap()
    }

    pub(crate) fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddedPlayer for FakeEmbeddedPlayer {
    async fn play_video(&self) -> CoreResult<()> {
        self.set_state(PlayerState::Playing);
        Ok(())
    }

    async fn pause_video(&self) -> CoreResult<()> {
        self.set_state(PlayerState::Paused);
        Ok(())
    }

    async fn seek_to(&self, seconds: TimeSec, _allow_seek_ahead: bool) -> CoreResult<()> {
        self.set_position(clamp_time(seconds, self.duration));
        Ok(())
    }

    async fn current_time(&self) -> CoreResult<TimeSec> {
        Ok(self.position())
    }

    async fn duration(&self) -> CoreResult<TimeSec> {
        let pending = self
            .pending_duration_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match pending {
            Ok(_) => Ok(0.0),
            Err(_) => Ok(self.duration),
        }
    }

    async fn state(&self) -> CoreResult<PlayerState> {
        Ok(self.state_now())
    }

    async fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
        record(&self.journal, "player destroyed");
    }
}

pub(crate) struct FakeEmbedHost {
    duration: TimeSec,
    late_duration_reads: AtomicUsize,
    api_loads: AtomicUsize,
    players: Mutex<Vec<Arc<FakeEmbeddedPlayer>>>,
    last_options: Mutex<Option<EmbedOptions>>,
    journal: Option<Journal>,
}

impl FakeEmbedHost {
    pub(crate) fn new(duration: TimeSec) -> Arc<Self> {
        Self::build(duration, None)
    }

    pub(crate) fn with_journal(duration: TimeSec, journal: Journal) -> Arc<Self> {
        Self::build(duration, Some(journal))
    }

    fn build(duration: TimeSec, journal: Option<Journal>) -> Arc<Self> {
        Arc::new(Self {
            duration,
            late_duration_reads: AtomicUsize::new(0),
            api_loads: AtomicUsize::new(0),
            players: Mutex::new(Vec::new()),
            last_options: Mutex::new(None),
            journal,
        })
    }

    /// Players created from now on report a zero duration for their first
    /// `reads` duration queries
    pub(crate) fn delay_duration(&self, reads: usize) {
        self.late_duration_reads.store(reads, Ordering::SeqCst);
    }

    pub(crate) fn api_loads(&self) -> usize {
        self.api_loads.load(Ordering::SeqCst)
    }

    pub(crate) fn players_created(&self) -> usize {
        self.players.lock().unwrap().len()
    }

    pub(crate) fn last_player(&self) -> Option<Arc<FakeEmbeddedPlayer>> {
        self.players.lock().unwrap().last().cloned()
    }

    pub(crate) fn last_options(&self) -> Option<EmbedOptions> {
        self.last_options.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmbedHost for FakeEmbedHost {
    async fn load_api(&self) -> CoreResult<()> {
        self.api_loads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn create_player(
        &self,
        _video_id: &str,
        options: &EmbedOptions,
    ) -> CoreResult<Arc<dyn EmbeddedPlayer>> {
        let player = Arc::new(FakeEmbeddedPlayer {
            duration: self.duration,
            pending_duration_reads: AtomicUsize::new(
                self.late_duration_reads.load(Ordering::SeqCst),
            ),
            position: Mutex::new(0.0),
            state: Mutex::new(PlayerState::Unstarted),
            destroyed: AtomicBool::new(false),
            journal: self.journal.clone(),
        });
        self.players.lock().unwrap().push(Arc::clone(&player));
        *self.last_options.lock().unwrap() = Some(options.clone());
        record(&self.journal, "player created");
        Ok(player)
    }
}
