//! Settings Persistence
//!
//! Persistent application settings with:
//! - Atomic file writes (temp file + rename)
//! - Tolerant loading: missing fields take defaults, bad values are clamped
//!
//! Storage location: {config_dir}/volleycut/settings.json

use std::fs;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{CoreError, CoreResult};

/// Settings schema version for migration support
pub const SETTINGS_VERSION: u32 = 1;

/// Settings file name
pub const SETTINGS_FILE: &str = "settings.json";

/// Lock file name (advisory lock to prevent concurrent writers)
pub const SETTINGS_LOCK_FILE: &str = "settings.json.lock";

/// Default settings directory for the current user
pub fn default_settings_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("volleycut")
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    /// Schema version for migrations
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub ffmpeg: FFmpegSettings,

    #[serde(default)]
    pub playback: PlaybackSettings,

    #[serde(default)]
    pub auto_tag: AutoTagSettings,
}

fn default_version() -> u32 {
    SETTINGS_VERSION
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            ffmpeg: FFmpegSettings::default(),
            playback: PlaybackSettings::default(),
            auto_tag: AutoTagSettings::default(),
        }
    }
}

impl AppSettings {
    /// Normalizes and clamps settings so persisted state is always valid.
    ///
    /// Corrects bad values instead of failing, so a damaged file still loads.
    pub fn normalize(&mut self) {
        self.version = SETTINGS_VERSION;

        self.ffmpeg.ffmpeg_path = non_blank_path(self.ffmpeg.ffmpeg_path.take());
        self.ffmpeg.ffprobe_path = non_blank_path(self.ffmpeg.ffprobe_path.take());

        self.playback.time_update_interval_ms =
            self.playback.time_update_interval_ms.clamp(50, 1000);
        if self.playback.mpv_path.as_os_str().is_empty() {
            self.playback.mpv_path = default_mpv_path();
        }

        self.auto_tag.normalize();
    }
}

fn non_blank_path(path: Option<PathBuf>) -> Option<PathBuf> {
    path.filter(|p| !p.as_os_str().to_string_lossy().trim().is_empty())
}

fn non_blank(value: &str, fallback: String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback
    } else {
        trimmed.trim_end_matches('/').to_string()
    }
}

/// FFmpeg binary locations. Unset means auto-detect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct FFmpegSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ffmpeg_path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ffprobe_path: Option<PathBuf>,
}

/// Playback settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSettings {
    /// Local surface time update cadence (50 - 1000 ms)
    #[serde(default = "default_time_update_interval")]
    pub time_update_interval_ms: u64,

    /// mpv binary used for embedded videos
    #[serde(default = "default_mpv_path")]
    pub mpv_path: PathBuf,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            time_update_interval_ms: default_time_update_interval(),
            mpv_path: default_mpv_path(),
        }
    }
}

impl PlaybackSettings {
    pub fn time_update_interval(&self) -> Duration {
        Duration::from_millis(self.time_update_interval_ms)
    }
}

fn default_time_update_interval() -> u64 {
    250
}

fn default_mpv_path() -> PathBuf {
    PathBuf::from("mpv")
}

/// Auto-tagging service settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AutoTagSettings {
    /// Try the local proxy before the direct service
    #[serde(default = "default_true")]
    pub proxy_enabled: bool,

    #[serde(default = "default_proxy_url")]
    pub proxy_url: String,

    #[serde(default = "default_anthropic_base_url")]
    pub anthropic_base_url: String,

    /// Per-request timeout (5 - 600 s)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Seeds the credential cache; never written by the session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anthropic_api_key: Option<String>,
}

impl Default for AutoTagSettings {
    fn default() -> Self {
        Self {
            proxy_enabled: true,
            proxy_url: default_proxy_url(),
            anthropic_base_url: default_anthropic_base_url(),
            request_timeout_secs: default_request_timeout(),
            anthropic_api_key: None,
        }
    }
}

impl AutoTagSettings {
    pub fn normalize(&mut self) {
        self.proxy_url = non_blank(&self.proxy_url, default_proxy_url());
        self.anthropic_base_url = non_blank(&self.anthropic_base_url, default_anthropic_base_url());
        self.request_timeout_secs = self.request_timeout_secs.clamp(5, 600);
        self.anthropic_api_key = self
            .anthropic_api_key
            .take()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_true() -> bool {
    true
}

fn default_proxy_url() -> String {
    "http://localhost:8080/api/auto-tag".to_string()
}

fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

// =============================================================================
// Settings Manager
// =============================================================================

/// Settings manager for loading, saving, and resetting settings
pub struct SettingsManager {
    settings_path: PathBuf,
}

impl SettingsManager {
    /// Create a new settings manager for the given directory
    pub fn new(settings_dir: PathBuf) -> Self {
        Self {
            settings_path: settings_dir.join(SETTINGS_FILE),
        }
    }

    fn lock_path(&self) -> PathBuf {
        self.settings_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(SETTINGS_LOCK_FILE)
    }

    fn with_lock<T>(&self, exclusive: bool, op: impl FnOnce() -> CoreResult<T>) -> CoreResult<T> {
        if let Some(parent) = self.settings_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(self.lock_path())?;

        if exclusive {
            fs2::FileExt::lock_exclusive(&lock_file)?;
        } else {
            fs2::FileExt::lock_shared(&lock_file)?;
        }

        let result = op();

        if let Err(e) = fs2::FileExt::unlock(&lock_file) {
            warn!("Failed to unlock settings lock file: {}", e);
        }

        result
    }

    /// Get the settings file path
    pub fn settings_path(&self) -> &Path {
        &self.settings_path
    }

    /// Load settings from disk, returning defaults if the file is missing or unreadable
    pub fn load(&self) -> AppSettings {
        let result = self.with_lock(false, || {
            if !self.settings_path.exists() {
                info!("Settings file not found, using defaults");
                return Ok(AppSettings::default());
            }

            let content = fs::read_to_string(&self.settings_path)?;
            let mut settings = serde_json::from_str::<AppSettings>(&content)?;

            if settings.version < SETTINGS_VERSION {
                info!(
                    "Migrating settings from version {} to {}",
                    settings.version, SETTINGS_VERSION
                );
            }

            settings.normalize();
            Ok(settings)
        });

        match result {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Failed to load settings, using defaults: {}", e);
                AppSettings::default()
            }
        }
    }

    /// Save settings to disk using atomic write (temp file + rename)
    pub fn save(&self, settings: &AppSettings) -> CoreResult<AppSettings> {
        self.with_lock(true, || {
            let mut normalized = settings.clone();
            normalized.normalize();

            let content = serde_json::to_string_pretty(&normalized)?;

            let temp_path = self.settings_path.with_extension("json.tmp");
            if temp_path.exists() {
                let _ = fs::remove_file(&temp_path);
            }

            let mut file = fs::File::create(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;

            if cfg!(windows) && self.settings_path.exists() {
                // rename does not overwrite on Windows
                fs::remove_file(&self.settings_path)?;
            }
            fs::rename(&temp_path, &self.settings_path).map_err(|e| {
                CoreError::Internal(format!("Failed to finalize settings file: {}", e))
            })?;

            info!("Settings saved to {:?}", self.settings_path);
            Ok(normalized)
        })
    }

    /// Merges a partial JSON update into the current settings and saves it
    pub fn update(&self, patch: serde_json::Value) -> CoreResult<AppSettings> {
        let mut current = serde_json::to_value(self.load())?;
        merge_json(&mut current, patch);

        let updated: AppSettings = serde_json::from_value(current).map_err(|e| {
            CoreError::ValidationError(format!("Failed to apply settings update: {}", e))
        })?;
        self.save(&updated)
    }

    /// Reset settings to defaults and delete the settings file
    pub fn reset(&self) -> CoreResult<AppSettings> {
        self.with_lock(true, || {
            if self.settings_path.exists() {
                fs::remove_file(&self.settings_path)?;
                info!("Settings file deleted");
            }
            Ok(AppSettings::default())
        })
    }
}

/// Deep merge of JSON objects; non-object values replace
fn merge_json(base: &mut serde_json::Value, patch: serde_json::Value) {
    use serde_json::Value;
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                let base_value = base_map.entry(key).or_insert(Value::Null);
                merge_json(base_value, patch_value);
            }
        }
        (base, patch) => *base = patch,
    }
}
