//! Backend selection by source kind

use std::sync::Arc;

use tracing::warn;

use super::embed::{EmbedAdapter, EmbedApiLoader};
use super::local::{LocalFileAdapter, SurfaceOpener};
use super::surface::FfmpegSurfaceOpener;
use super::{PlaybackAdapter, SourceKind};
use crate::ffmpeg::{detect_ffmpeg, FFmpegError, FFmpegRunner};
use crate::settings::AppSettings;
use crate::{CoreError, CoreResult};

/// Creates a fresh playback adapter for a source kind
pub trait AdapterFactory: Send + Sync {
    fn create(&self, kind: SourceKind) -> CoreResult<Box<dyn PlaybackAdapter>>;
}

/// The available playback backends
#[derive(Clone)]
pub struct Backends {
    surfaces: Option<Arc<dyn SurfaceOpener>>,
    embed: Option<Arc<EmbedApiLoader>>,
}

impl Backends {
    pub fn new(
        surfaces: Option<Arc<dyn SurfaceOpener>>,
        embed: Option<Arc<EmbedApiLoader>>,
    ) -> Self {
        Self { surfaces, embed }
    }

    /// FFmpeg-backed local playback and, on unix, mpv-backed embeds.
    ///
    /// A missing FFmpeg disables local files only.
    pub fn from_settings(settings: &AppSettings) -> Self {
        let surfaces = match detect_ffmpeg(
            settings.ffmpeg.ffmpeg_path.as_deref(),
            settings.ffmpeg.ffprobe_path.as_deref(),
        ) {
            Ok(info) => Some(Arc::new(FfmpegSurfaceOpener::new(
                FFmpegRunner::new(info),
                settings.playback.time_update_interval(),
            )) as Arc<dyn SurfaceOpener>),
            Err(e) => {
                warn!("Local playback unavailable: {}", e);
                None
            }
        };

        #[cfg(unix)]
        let embed = Some(Arc::new(EmbedApiLoader::new(Arc::new(
            super::mpv::MpvHost::new(settings.playback.mpv_path.clone()),
        ))));
        #[cfg(not(unix))]
        let embed = None;

        Self { surfaces, embed }
    }
}

impl AdapterFactory for Backends {
    fn create(&self, kind: SourceKind) -> CoreResult<Box<dyn PlaybackAdapter>> {
        match kind {
            SourceKind::LocalFile => {
                let surfaces = self
                    .surfaces
                    .clone()
                    .ok_or(CoreError::FFmpeg(FFmpegError::NotFound))?;
                Ok(Box::new(LocalFileAdapter::new(surfaces)))
            }
            SourceKind::RemoteEmbed => {
                let loader = self.embed.clone().ok_or_else(|| {
                    CoreError::NotSupported(
                        "YouTube playback is not available on this platform".to_string(),
                    )
                })?;
                Ok(Box::new(EmbedAdapter::new(loader)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::testing::{FakeEmbedHost, FakeSurfaceOpener};

    #[test]
    fn test_creates_adapter_per_kind() {
        let backends = Backends::new(
            Some(FakeSurfaceOpener::new(10.0)),
            Some(Arc::new(EmbedApiLoader::new(FakeEmbedHost::new(10.0)))),
        );

        let local = backends.create(SourceKind::LocalFile).unwrap();
        assert_eq!(local.kind(), SourceKind::LocalFile);
        let remote = backends.create(SourceKind::RemoteEmbed).unwrap();
        assert_eq!(remote.kind(), SourceKind::RemoteEmbed);
    }

    #[test]
    fn test_missing_backends_are_reported() {
        let backends = Backends::new(None, None);
        assert!(matches!(
            backends.create(SourceKind::LocalFile),
            Err(CoreError::FFmpeg(FFmpegError::NotFound))
        ));
        assert!(matches!(
            backends.create(SourceKind::RemoteEmbed),
            Err(CoreError::NotSupported(_))
        ));
    }
}
