//! Auto-Tag Classifier
//!
//! Samples three frames of a clip from the local playback surface, sends them
//! to a labeling service and maps the answer onto the fixed label set.

mod anthropic;
mod proxy;
mod service;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::labels::Label;
use crate::playback::{EncodedFrame, PlaybackAdapter, SourceKind};
use crate::transport::Transport;
use crate::types::{format_timecode, ClipId, TimeSec};
use crate::{CoreError, CoreResult};

pub use anthropic::AnthropicLabelService;
pub use proxy::ProxyLabelService;
pub use service::{AutoTagClient, LabelService};

/// JPEG quality of captured frames
pub const SAMPLE_QUALITY: f32 = 0.8;

/// Shortest span used when placing samples
pub const MIN_SAMPLE_SPAN: TimeSec = 0.5;

/// Instruction sent with the frames
pub fn instruction() -> String {
    format!(
        "You are labeling volleyball actions. From the provided frames of a short clip, \
         choose exactly one label from: {}. Respond with only the single word label.",
        Label::joined_names()
    )
}

const EMBED_REFUSAL: &str =
    "Auto-tagging is not available for YouTube videos. Download the video to use auto-tagging.";

/// Sample points at 10%, 50% and 90% of the clip, clamped into the clip
pub fn sample_timestamps(start: TimeSec, end: TimeSec) -> [TimeSec; 3] {
    let span = (end - start).max(MIN_SAMPLE_SPAN);
    [start + 0.1 * span, start + 0.5 * span, end - 0.1 * span].map(|t| t.max(start).min(end))
}

/// Captures the sample frames of `[start, end]` in order.
///
/// Each frame is taken paused, after its seek has completed. Playback resumes
/// afterwards if it was running, whether or not the captures succeeded.
pub async fn capture_clip_frames(
    adapter: &dyn PlaybackAdapter,
    start: TimeSec,
    end: TimeSec,
) -> CoreResult<Vec<EncodedFrame>> {
    let grabber = adapter.frame_grabber().ok_or_else(|| {
        CoreError::NotSupported(format!("Frame capture is not available for {}", adapter.kind()))
    })?;

    let was_playing = adapter.is_playing().await;

    let mut captured = Ok(Vec::with_capacity(3));
    for t in sample_timestamps(start, end) {
        let frame = async {
            adapter.pause().await?;
            adapter.seek(t).await?;
            grabber.grab_frame(SAMPLE_QUALITY).await
        }
        .await;

        match frame {
            Ok(frame) => {
                if let Ok(frames) = &mut captured {
                    frames.push(frame);
                }
            }
            Err(e) => {
                captured = Err(e);
                break;
            }
        }
    }

    if was_playing {
        if let Err(e) = adapter.play().await {
            warn!("Failed to resume playback after capture: {}", e);
        }
    }

    captured
}

/// Outcome of a batch run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub tagged: usize,
    pub failed: usize,
}

/// Drives classification of saved clips and reports through the notifier
pub struct AutoTagger {
    client: AutoTagClient,
}

impl AutoTagger {
    pub fn new(client: AutoTagClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &AutoTagClient {
        &self.client
    }

    /// Classifies one clip and replaces its tag.
    ///
    /// Every outcome is also reported as a notice. On failure the tag is left
    /// unchanged.
    pub async fn tag_clip(&self, transport: &mut Transport, clip_id: &str) -> CoreResult<Label> {
        let result = self.classify_clip(transport, clip_id).await;
        match &result {
            Ok(label) => transport
                .notifier()
                .success(format!("Auto-tagged as {}", label)),
            Err(CoreError::NotSupported(_)) => {}
            Err(e) => transport.notifier().error(e.to_string()),
        }
        result
    }

    async fn classify_clip(&self, transport: &mut Transport, clip_id: &str) -> CoreResult<Label> {
        let (start, end) = {
            let clip = transport
                .clips()
                .get(clip_id)
                .ok_or_else(|| CoreError::ClipNotFound(clip_id.to_string()))?;
            (clip.start, clip.end)
        };

        let adapter = transport.adapter().ok_or(CoreError::NoSourceLoaded)?;
        if adapter.kind() == SourceKind::RemoteEmbed {
            transport.notifier().info(EMBED_REFUSAL);
            return Err(CoreError::NotSupported(EMBED_REFUSAL.to_string()));
        }

        transport.notifier().message(format!(
            "Analyzing clip {} → {}...",
            format_timecode(start),
            format_timecode(end)
        ));

        let frames = capture_clip_frames(adapter, start, end).await;
        transport.drain_events();
        let label = self.client.classify(&frames?).await?;

        transport.set_clip_tag(clip_id, label)?;
        info!("Clip {} auto-tagged as {}", clip_id, label);
        Ok(label)
    }

    /// Classifies every clip in list order, one at a time.
    ///
    /// A failing clip is reported and skipped.
    pub async fn tag_all(&self, transport: &mut Transport) -> BatchSummary {
        let mut summary = BatchSummary::default();

        if transport.source().map(|s| s.kind()) == Some(SourceKind::RemoteEmbed) {
            transport
                .notifier()
                .info("Auto-tagging is not available for YouTube videos.");
            return summary;
        }

        let ids: Vec<ClipId> = transport.clips().ids();
        for id in ids {
            match self.tag_clip(transport, &id).await {
                Ok(_) => summary.tagged += 1,
                Err(_) => summary.failed += 1,
            }
        }

        if summary.tagged + summary.failed > 0 {
            info!(
                "Batch auto-tag finished: {} tagged, {} failed",
                summary.tagged, summary.failed
            );
            transport.notifier().message(format!(
                "Auto-tagged {} of {} clips",
                summary.tagged,
                summary.tagged + summary.failed
            ));
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::service::fakes::ScriptedService;
    use super::*;
    use crate::credentials::CredentialCache;
    use crate::notify::{Notice, NoticeLevel, Notifier};
    use crate::playback::testing::{FakeEmbedHost, FakeSurfaceOpener};
    use crate::playback::{Backends, EmbedApiLoader};
    use std::sync::Arc;
    use tempfile::NamedTempFile;
    use tokio::sync::broadcast;

    struct Harness {
        transport: Transport,
        opener: Arc<FakeSurfaceOpener>,
        notices: broadcast::Receiver<Notice>,
        _video: NamedTempFile,
    }

    impl Harness {
        async fn loaded(duration: TimeSec) -> Self {
            let opener = FakeSurfaceOpener::new(duration);
            let host = FakeEmbedHost::new(300.0);
            let backends = Backends::new(
                Some(opener.clone()),
                Some(Arc::new(EmbedApiLoader::new(host))),
            );
            let notifier = Notifier::new();
            let notices = notifier.subscribe();
            let video = NamedTempFile::new().unwrap();
            let mut transport = Transport::new(Arc::new(backends), notifier);
            transport
                .load(&video.path().to_string_lossy())
                .await
                .unwrap();
            Self {
                transport,
                opener,
                notices,
                _video: video,
            }
        }

        async fn save(&mut self, start: TimeSec, end: TimeSec, tag: Label) -> ClipId {
            self.transport.seek_to(start).await.unwrap();
            self.transport.mark_in().await;
            self.transport.seek_to(end).await.unwrap();
            self.transport.mark_out().await;
            self.transport.save_clip(tag).unwrap().id
        }

        fn notices(&mut self) -> Vec<Notice> {
            let mut all = Vec::new();
            while let Ok(notice) = self.notices.try_recv() {
                all.push(notice);
            }
            all
        }
    }

    fn tagger(service: Arc<ScriptedService>) -> AutoTagger {
        AutoTagger::new(
            AutoTagClient::new(Arc::new(CredentialCache::default())).with_service(service),
        )
    }

    #[test]
    fn test_instruction_lists_every_label() {
        assert_eq!(
            instruction(),
            "You are labeling volleyball actions. From the provided frames of a short clip, \
             choose exactly one label from: Serve, Pass, Set, Attack, Block, Dig, Error. \
             Respond with only the single word label."
        );
    }

    #[test]
    fn test_sample_timestamps() {
        let [a, b, c] = sample_timestamps(10.0, 12.5);
        assert!((a - 10.25).abs() < 1e-9);
        assert!((b - 11.25).abs() < 1e-9);
        assert!((c - 12.25).abs() < 1e-9);
    }

    #[test]
    fn test_sample_timestamps_short_clip_stays_inside() {
        // Span is widened to 0.5 s, then clamped back into the clip
        let [a, b, c] = sample_timestamps(5.0, 5.2);
        assert!((a - 5.05).abs() < 1e-9);
        assert!((b - 5.2).abs() < 1e-9);
        assert!((c - 5.15).abs() < 1e-9);
        for t in [a, b, c] {
            assert!((5.0..=5.2).contains(&t));
        }
    }

    #[tokio::test]
    async fn test_captures_sample_points_in_order() {
        let h = Harness::loaded(120.0).await;
        let adapter = h.transport.adapter().unwrap();

        let frames = capture_clip_frames(adapter, 10.0, 12.5).await.unwrap();

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].bytes, b"frame@10.250".to_vec());
        assert_eq!(frames[2].bytes, b"frame@12.250".to_vec());
        let surface = h.opener.last().unwrap();
        assert_eq!(surface.captures().len(), 3);
        assert!(!adapter.is_playing().await);
    }

    #[tokio::test]
    async fn test_capture_resumes_playback() {
        let mut h = Harness::loaded(120.0).await;
        h.transport.play().await.unwrap();
        let adapter = h.transport.adapter().unwrap();

        capture_clip_frames(adapter, 10.0, 12.5).await.unwrap();
        assert!(adapter.is_playing().await);
    }

    #[tokio::test]
    async fn test_capture_failure_still_resumes_playback() {
        let mut h = Harness::loaded(120.0).await;
        h.transport.play().await.unwrap();
        h.opener.last().unwrap().fail_capture_at(1);
        let adapter = h.transport.adapter().unwrap();

        let err = capture_clip_frames(adapter, 10.0, 12.5).await.unwrap_err();
        assert!(matches!(err, CoreError::CaptureFailed(_)));
        assert!(adapter.is_playing().await);
    }

    #[tokio::test]
    async fn test_tag_clip_updates_only_target() {
        let mut h = Harness::loaded(120.0).await;
        let first = h.save(1.0, 2.0, Label::Serve).await;
        let second = h.save(10.0, 12.5, Label::Serve).await;
        h.notices();

        let service = ScriptedService::answering("proxy", false, "Dig.");
        let label = tagger(service.clone())
            .tag_clip(&mut h.transport, &second)
            .await
            .unwrap();

        assert_eq!(label, Label::Dig);
        assert_eq!(h.transport.clips().get(&second).unwrap().tag, Label::Dig);
        assert_eq!(h.transport.clips().get(&first).unwrap().tag, Label::Serve);
        assert_eq!(service.calls.lock().unwrap()[0].0, 3);

        let notices = h.notices();
        assert_eq!(notices[0].level, NoticeLevel::Message);
        assert_eq!(notices[0].text, "Analyzing clip 00:10.000 → 00:12.500...");
        let last = notices.last().unwrap();
        assert_eq!(last.level, NoticeLevel::Success);
        assert_eq!(last.text, "Auto-tagged as Dig");
    }

    #[tokio::test]
    async fn test_service_failure_leaves_tag() {
        let mut h = Harness::loaded(120.0).await;
        let id = h.save(10.0, 12.5, Label::Pass).await;
        h.notices();

        let result = tagger(ScriptedService::failing("proxy", false))
            .tag_clip(&mut h.transport, &id)
            .await;

        assert!(matches!(result, Err(CoreError::AIRequestFailed(_))));
        assert_eq!(h.transport.clips().get(&id).unwrap().tag, Label::Pass);
        let last = h.notices().pop().unwrap();
        assert_eq!(last.level, NoticeLevel::Error);
        assert!(last.text.contains("proxy is down"));
    }

    #[tokio::test]
    async fn test_frame_not_ready_aborts_clip() {
        let opener = FakeSurfaceOpener::new(120.0);
        opener.without_picture();
        let backends = Backends::new(Some(opener), None);
        let notifier = Notifier::new();
        let mut notices = notifier.subscribe();
        let video = NamedTempFile::new().unwrap();
        let mut transport = Transport::new(Arc::new(backends), notifier);
        transport.load(&video.path().to_string_lossy()).await.unwrap();
        transport.seek_to(1.0).await.unwrap();
        transport.mark_in().await;
        transport.seek_to(3.0).await.unwrap();
        transport.mark_out().await;
        let id = transport.save_clip(Label::Set).unwrap().id;

        let service = ScriptedService::answering("proxy", false, "Attack");
        let result = tagger(service.clone()).tag_clip(&mut transport, &id).await;

        assert!(matches!(result, Err(CoreError::FrameNotReady)));
        assert_eq!(service.call_count(), 0);
        let mut last = None;
        while let Ok(n) = notices.try_recv() {
            last = Some(n);
        }
        assert_eq!(last.unwrap().text, "Video not ready");
    }

    #[tokio::test]
    async fn test_youtube_source_is_refused() {
        let mut h = Harness::loaded(120.0).await;
        h.transport
            .load("https://youtu.be/dQw4w9WgXcQ")
            .await
            .unwrap();
        h.transport.seek_to(1.0).await.unwrap();
        h.transport.mark_in().await;
        h.transport.seek_to(2.0).await.unwrap();
        h.transport.mark_out().await;
        let id = h.transport.save_clip(Label::Block).unwrap().id;
        h.notices();

        let service = ScriptedService::answering("proxy", false, "Attack");
        let result = tagger(service.clone()).tag_clip(&mut h.transport, &id).await;

        assert!(matches!(result, Err(CoreError::NotSupported(_))));
        assert_eq!(service.call_count(), 0);
        let notices = h.notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Info);
        assert_eq!(notices[0].text, EMBED_REFUSAL);
    }

    #[tokio::test]
    async fn test_unknown_clip() {
        let mut h = Harness::loaded(120.0).await;
        let result = tagger(ScriptedService::answering("proxy", false, "Set"))
            .tag_clip(&mut h.transport, "missing")
            .await;
        assert!(matches!(result, Err(CoreError::ClipNotFound(_))));
    }

    #[tokio::test]
    async fn test_batch_continues_past_failures() {
        let mut h = Harness::loaded(120.0).await;
        h.save(1.0, 2.0, Label::Serve).await;
        h.save(10.0, 12.5, Label::Serve).await;
        h.save(20.0, 22.0, Label::Serve).await;
        // Second capture of the newest clip fails; the other two still run
        h.opener.last().unwrap().fail_capture_at(1);

        let summary = tagger(ScriptedService::answering("proxy", false, "Set"))
            .tag_all(&mut h.transport)
            .await;

        assert_eq!(summary, BatchSummary { tagged: 2, failed: 1 });
        let tags: Vec<Label> = h.transport.clips().iter().map(|c| c.tag).collect();
        assert_eq!(tags, vec![Label::Serve, Label::Set, Label::Set]);
        assert_eq!(h.notices().last().unwrap().text, "Auto-tagged 2 of 3 clips");
    }
}
