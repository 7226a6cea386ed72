//! FFmpeg Detection Module
//!
//! Locates FFmpeg/FFprobe binaries: explicit paths first, then common
//! install locations, then the system PATH.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use super::{FFmpegError, FFmpegResult};

/// Information about a detected FFmpeg installation
#[derive(Debug, Clone)]
pub struct FFmpegInfo {
    /// Path to ffmpeg binary
    pub ffmpeg_path: PathBuf,
    /// Path to ffprobe binary
    pub ffprobe_path: PathBuf,
    /// FFmpeg version string
    pub version: String,
}

/// Detect FFmpeg, honoring explicit binary paths when given.
pub fn detect_ffmpeg(
    ffmpeg_override: Option<&Path>,
    ffprobe_override: Option<&Path>,
) -> FFmpegResult<FFmpegInfo> {
    let ffmpeg_path = match ffmpeg_override {
        Some(path) if path.exists() => path.to_path_buf(),
        Some(path) => {
            return Err(FFmpegError::InvalidInput(format!(
                "Configured ffmpeg does not exist: {}",
                path.display()
            )))
        }
        None => which_binary(FFMPEG_BINARY)?,
    };

    let ffprobe_path = match ffprobe_override {
        Some(path) if path.exists() => path.to_path_buf(),
        Some(path) => {
            return Err(FFmpegError::InvalidInput(format!(
                "Configured ffprobe does not exist: {}",
                path.display()
            )))
        }
        None => which_binary(FFPROBE_BINARY)?,
    };

    let version = get_ffmpeg_version(&ffmpeg_path)?;
    info!("Using FFmpeg {} at {}", version, ffmpeg_path.display());

    Ok(FFmpegInfo {
        ffmpeg_path,
        ffprobe_path,
        version,
    })
}

#[cfg(target_os = "windows")]
const FFMPEG_BINARY: &str = "ffmpeg.exe";
#[cfg(not(target_os = "windows"))]
const FFMPEG_BINARY: &str = "ffmpeg";

#[cfg(target_os = "windows")]
const FFPROBE_BINARY: &str = "ffprobe.exe";
#[cfg(not(target_os = "windows"))]
const FFPROBE_BINARY: &str = "ffprobe";

/// Find a binary in common install locations, then via `which`/`where`
fn which_binary(binary_name: &str) -> FFmpegResult<PathBuf> {
    for dir in get_common_ffmpeg_paths() {
        let candidate = dir.join(binary_name);
        if candidate.exists() {
            debug!("Found {} at {}", binary_name, candidate.display());
            return Ok(candidate);
        }
    }

    #[cfg(target_os = "windows")]
    let locator = "where";
    #[cfg(not(target_os = "windows"))]
    let locator = "which";

    let output = Command::new(locator)
        .arg(binary_name)
        .output()
        .map_err(|_| FFmpegError::NotFound)?;

    if output.status.success() {
        let path_str = String::from_utf8_lossy(&output.stdout);
        if let Some(first_line) = path_str.lines().next() {
            let trimmed = first_line.trim();
            if !trimmed.is_empty() {
                return Ok(PathBuf::from(trimmed));
            }
        }
    }

    Err(FFmpegError::NotFound)
}

/// Get common FFmpeg installation paths for the current platform
fn get_common_ffmpeg_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    #[cfg(target_os = "windows")]
    {
        paths.push(PathBuf::from(r"C:\ffmpeg\bin"));
        paths.push(PathBuf::from(r"C:\Program Files\ffmpeg\bin"));

        if let Ok(userprofile) = std::env::var("USERPROFILE") {
            paths.push(PathBuf::from(userprofile).join("scoop").join("shims"));
        }
    }

    #[cfg(target_os = "macos")]
    {
        paths.push(PathBuf::from("/opt/homebrew/bin"));
        paths.push(PathBuf::from("/usr/local/bin"));
        paths.push(PathBuf::from("/opt/local/bin")); // MacPorts
    }

    #[cfg(target_os = "linux")]
    {
        paths.push(PathBuf::from("/usr/bin"));
        paths.push(PathBuf::from("/usr/local/bin"));
        paths.push(PathBuf::from("/snap/bin"));
    }

    paths
}

/// Get FFmpeg version string
fn get_ffmpeg_version(ffmpeg_path: &Path) -> FFmpegResult<String> {
    let output = Command::new(ffmpeg_path)
        .arg("-version")
        .output()
        .map_err(FFmpegError::ProcessError)?;

    if !output.status.success() {
        return Err(FFmpegError::ExecutionFailed(
            "Failed to get FFmpeg version".to_string(),
        ));
    }

    parse_version_line(&String::from_utf8_lossy(&output.stdout))
}

/// Parse version from the first line: "ffmpeg version X.X.X ..."
fn parse_version_line(output: &str) -> FFmpegResult<String> {
    let first_line = output
        .lines()
        .next()
        .ok_or_else(|| FFmpegError::ParseError("Could not parse FFmpeg version".to_string()))?;

    if let Some(version) = first_line
        .strip_prefix("ffmpeg version ")
        .and_then(|rest| rest.split_whitespace().next())
    {
        return Ok(version.to_string());
    }

    Ok(first_line.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_paths_not_empty() {
        let paths = get_common_ffmpeg_paths();
        assert!(!paths.is_empty());
    }

    #[test]
    fn test_parse_version_line() {
        let out = "ffmpeg version 6.1.1-3ubuntu5 Copyright (c) 2000-2023\nbuilt with gcc";
        assert_eq!(parse_version_line(out).unwrap(), "6.1.1-3ubuntu5");
        assert_eq!(parse_version_line("weird build").unwrap(), "weird build");
        assert!(parse_version_line("").is_err());
    }

    #[test]
    fn test_missing_override_is_rejected() {
        let result = detect_ffmpeg(Some(Path::new("/definitely/not/ffmpeg")), None);
        assert!(matches!(result, Err(FFmpegError::InvalidInput(_))));
    }

    #[test]
    fn test_detect_without_overrides() {
        // Passes whether or not FFmpeg is installed on the machine
        match detect_ffmpeg(None, None) {
            Ok(info) => assert!(!info.version.is_empty()),
            Err(FFmpegError::NotFound) => {}
            Err(e) => println!("FFmpeg detection returned: {}", e),
        }
    }
}
