//! Video Sources
//!
//! Local files and YouTube links, and the parsing between user input and the two.

use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::{CoreError, CoreResult};

/// Playback backend kind
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceKind {
    LocalFile,
    RemoteEmbed,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::LocalFile => write!(f, "local-file"),
            SourceKind::RemoteEmbed => write!(f, "remote-embed"),
        }
    }
}

/// A loadable video source
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VideoSource {
    LocalFile(PathBuf),
    RemoteEmbed { video_id: String },
}

impl VideoSource {
    /// Interprets user input: an existing file, otherwise a YouTube link.
    pub fn parse(input: &str) -> CoreResult<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(CoreError::UnsupportedSource("empty input".to_string()));
        }

        let path = PathBuf::from(input);
        if path.is_file() {
            return Ok(VideoSource::LocalFile(path));
        }

        if looks_like_link(input) {
            return Self::youtube(input);
        }

        Err(CoreError::FileNotFound(input.to_string()))
    }

    /// Builds a remote source from a YouTube link
    pub fn youtube(link: &str) -> CoreResult<Self> {
        parse_youtube_id(link.trim())
            .map(|video_id| VideoSource::RemoteEmbed { video_id })
            .ok_or(CoreError::InvalidYouTubeUrl)
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            VideoSource::LocalFile(_) => SourceKind::LocalFile,
            VideoSource::RemoteEmbed { .. } => SourceKind::RemoteEmbed,
        }
    }
}

/// Canonical watch URL for a video id
pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}

impl std::fmt::Display for VideoSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VideoSource::LocalFile(path) => write!(f, "{}", path.display()),
            VideoSource::RemoteEmbed { video_id } => write!(f, "youtube:{}", video_id),
        }
    }
}

fn looks_like_link(input: &str) -> bool {
    input.contains("://") || input.contains("youtu")
}

/// Extracts a YouTube video id from watch, share, shorts and embed links.
pub fn parse_youtube_id(link: &str) -> Option<String> {
    match Url::parse(link) {
        Ok(url) => parse_youtube_url(&url),
        Err(_) => fallback_youtube_id(link),
    }
}

fn parse_youtube_url(url: &Url) -> Option<String> {
    let host = url.host_str()?;

    if host.contains("youtu.be") {
        return url
            .path_segments()?
            .next()
            .filter(|id| !id.is_empty())
            .map(str::to_string);
    }

    if host.contains("youtube.com") {
        if let Some((_, v)) = url.query_pairs().find(|(key, _)| key == "v") {
            if !v.is_empty() {
                return Some(v.into_owned());
            }
        }

        let segments: Vec<&str> = url.path_segments()?.collect();
        let idx = segments
            .iter()
            .position(|segment| matches!(*segment, "embed" | "shorts" | "v"))?;
        return segments
            .get(idx + 1)
            .filter(|id| !id.is_empty())
            .map(|id| id.to_string());
    }

    None
}

/// Scheme-less links don't parse as URLs; match the id pattern directly.
fn fallback_youtube_id(link: &str) -> Option<String> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = PATTERN
        .get_or_init(|| {
            Regex::new(
                r"(?:youtube\.com/(?:watch\?v=|embed/|shorts/)|youtu\.be/)([A-Za-z0-9_-]{11})",
            )
            .ok()
        })
        .as_ref()?;

    pattern
        .captures(link)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_link() {
        assert_eq!(
            parse_youtube_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42s"),
            Some("dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn test_share_link() {
        assert_eq!(
            parse_youtube_id("https://youtu.be/dQw4w9WgXcQ?si=abc"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(parse_youtube_id("https://youtu.be/"), None);
    }

    #[test]
    fn test_shorts_and_embed_links() {
        assert_eq!(
            parse_youtube_id("https://youtube.com/shorts/abcdefghijk"),
            Some("abcdefghijk".to_string())
        );
        assert_eq!(
            parse_youtube_id("https://www.youtube.com/embed/abcdefghijk?rel=0"),
            Some("abcdefghijk".to_string())
        );
        assert_eq!(
            parse_youtube_id("https://www.youtube.com/v/abcdefghijk"),
            Some("abcdefghijk".to_string())
        );
    }

    #[test]
    fn test_schemeless_link_uses_pattern() {
        assert_eq!(
            parse_youtube_id("youtube.com/watch?v=dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            parse_youtube_id("youtu.be/dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(parse_youtube_id("youtu.be/short"), None);
    }

    #[test]
    fn test_rejects_other_hosts_and_pages() {
        assert_eq!(parse_youtube_id("https://vimeo.com/12345"), None);
        assert_eq!(parse_youtube_id("https://www.youtube.com/feed/trending"), None);
        assert_eq!(parse_youtube_id("not a link"), None);
    }

    #[test]
    fn test_source_parse_local_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let source = VideoSource::parse(file.path().to_str().unwrap()).unwrap();
        assert_eq!(source.kind(), SourceKind::LocalFile);
    }

    #[test]
    fn test_source_parse_youtube() {
        let source = VideoSource::parse(" https://youtu.be/dQw4w9WgXcQ ").unwrap();
        assert_eq!(
            source,
            VideoSource::RemoteEmbed {
                video_id: "dQw4w9WgXcQ".to_string()
            }
        );
        assert_eq!(
            watch_url("dQw4w9WgXcQ"),
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
        );
    }

    #[test]
    fn test_source_parse_errors() {
        assert!(matches!(
            VideoSource::parse("https://www.youtube.com/feed"),
            Err(CoreError::InvalidYouTubeUrl)
        ));
        assert!(matches!(
            VideoSource::parse("/no/such/match.mp4"),
            Err(CoreError::FileNotFound(_))
        ));
        assert!(matches!(
            VideoSource::parse("   "),
            Err(CoreError::UnsupportedSource(_))
        ));
    }
}
