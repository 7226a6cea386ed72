//! VolleyCut CLI
//!
//! Terminal front end for marking, tagging and auto-tagging volleyball clips.

mod clipboard;
mod input;
mod logging;
mod prompt;
mod session;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use volleycut_core::autotag::{capture_clip_frames, AutoTagClient, AutoTagger};
use volleycut_core::credentials::{redact, CredentialCache};
use volleycut_core::ffmpeg::{detect_ffmpeg, FFmpegRunner};
use volleycut_core::playback::{AdapterFactory, Backends, SourceKind, VideoSource};
use volleycut_core::settings::{default_settings_dir, AppSettings, SettingsManager};
use volleycut_core::{Clip, Label, Notifier, Transport};

use crate::prompt::{shared_stdin, SharedStdin, StdinPrompt};
use crate::session::Session;

#[derive(Parser)]
#[command(name = "volleycut", version, about = "Mark, tag and auto-tag volleyball clips")]
struct Cli {
    /// Settings directory (defaults to the platform config dir)
    #[arg(long, global = true)]
    settings_dir: Option<PathBuf>,

    /// Anthropic API key for direct auto-tagging
    #[arg(long, global = true, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Skip the local auto-tag proxy
    #[arg(long, global = true)]
    no_proxy: bool,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive marking session
    Edit {
        /// Local video file or YouTube link to load first
        source: Option<String>,
    },
    /// Auto-tag one time range of a local video and print the label
    Classify {
        video: PathBuf,
        #[arg(long)]
        start: f64,
        #[arg(long)]
        end: f64,
    },
    /// Print probed media info as JSON
    Probe { video: PathBuf },
    /// Inspect or reset settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print the effective settings
    Show,
    /// Print the settings file path
    Path,
    /// Set one value by its dotted camelCase key, e.g. `autoTag.proxyEnabled false`
    Set {
        key: String,
        /// JSON value; anything that is not valid JSON is taken as a string
        value: String,
    },
    /// Delete the settings file
    Reset,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let manager = SettingsManager::new(cli.settings_dir.clone().unwrap_or_else(default_settings_dir));

    match cli.command {
        Commands::Edit { ref source } => {
            let settings = manager.load();
            let stdin = shared_stdin();
            let tagger = build_tagger(&cli, &settings, stdin.clone())?;
            let backends = Backends::from_settings(&settings);
            let transport = Transport::new(Arc::new(backends), Notifier::new());
            Session::new(transport, tagger, stdin)
                .run(source.clone())
                .await
        }
        Commands::Classify {
            ref video,
            start,
            end,
        } => {
            let settings = manager.load();
            let tagger = build_tagger(&cli, &settings, shared_stdin())?;
            let label = classify(&settings, &tagger, video, start, end).await?;
            println!("{}", label);
            Ok(())
        }
        Commands::Probe { ref video } => {
            let settings = manager.load();
            let info = detect_ffmpeg(
                settings.ffmpeg.ffmpeg_path.as_deref(),
                settings.ffmpeg.ffprobe_path.as_deref(),
            )?;
            let media = FFmpegRunner::new(info)
                .probe(video)
                .await
                .with_context(|| format!("Failed to probe {}", video.display()))?;
            println!("{}", serde_json::to_string_pretty(&media)?);
            Ok(())
        }
        Commands::Settings { ref action } => run_settings(&manager, action),
    }
}

fn build_tagger(cli: &Cli, settings: &AppSettings, stdin: SharedStdin) -> anyhow::Result<AutoTagger> {
    let seed = cli
        .api_key
        .clone()
        .or_else(|| settings.auto_tag.anthropic_api_key.clone());
    let credentials =
        CredentialCache::new(seed).with_prompt(Arc::new(StdinPrompt::new(stdin)));
    let client = AutoTagClient::from_settings(&settings.auto_tag, Arc::new(credentials), cli.no_proxy)?;
    Ok(AutoTagger::new(client))
}

async fn classify(
    settings: &AppSettings,
    tagger: &AutoTagger,
    video: &std::path::Path,
    start: f64,
    end: f64,
) -> anyhow::Result<Label> {
    let source = VideoSource::parse(&video.to_string_lossy())?;
    if source.kind() != SourceKind::LocalFile {
        bail!("Auto-tagging needs a local video file");
    }
    let range = Clip::new(start, end, Label::default())?;

    let adapter = Backends::from_settings(settings).create(SourceKind::LocalFile)?;
    adapter.load(&source).await?;
    let frames = capture_clip_frames(adapter.as_ref(), range.start, range.end).await;
    adapter.destroy().await;

    Ok(tagger.client().classify(&frames?).await?)
}

fn run_settings(manager: &SettingsManager, action: &SettingsAction) -> anyhow::Result<()> {
    match action {
        SettingsAction::Show => print_settings(manager.load())?,
        SettingsAction::Path => println!("{}", manager.settings_path().display()),
        SettingsAction::Set { key, value } => {
            let saved = manager.update(settings_patch(key, value)?)?;
            print_settings(saved)?;
        }
        SettingsAction::Reset => {
            manager.reset()?;
            println!("Settings reset to defaults");
        }
    }
    Ok(())
}

fn print_settings(mut settings: AppSettings) -> anyhow::Result<()> {
    if let Some(key) = settings.auto_tag.anthropic_api_key.as_mut() {
        *key = redact(key);
    }
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}

/// Nests `value` under the segments of a dotted key
fn settings_patch(key: &str, value: &str) -> anyhow::Result<serde_json::Value> {
    let leaf = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));

    key.split('.').rev().try_fold(leaf, |inner, segment| {
        if segment.is_empty() {
            bail!("Invalid settings key: {}", key);
        }
        let mut map = serde_json::Map::new();
        map.insert(segment.to_string(), inner);
        Ok(serde_json::Value::Object(map))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_settings_patch_nests_dotted_key() {
        assert_eq!(
            settings_patch("autoTag.proxyEnabled", "false").unwrap(),
            json!({"autoTag": {"proxyEnabled": false}})
        );
        assert_eq!(
            settings_patch("playback.timeUpdateIntervalMs", "100").unwrap(),
            json!({"playback": {"timeUpdateIntervalMs": 100}})
        );
    }

    #[test]
    fn test_settings_patch_falls_back_to_string() {
        assert_eq!(
            settings_patch("autoTag.proxyUrl", "http://localhost:9000/tag").unwrap(),
            json!({"autoTag": {"proxyUrl": "http://localhost:9000/tag"}})
        );
    }

    #[test]
    fn test_settings_patch_rejects_empty_segment() {
        assert!(settings_patch("autoTag..proxyUrl", "x").is_err());
        assert!(settings_patch("", "x").is_err());
    }

    #[test]
    fn test_cli_parses_settings_set() {
        let cli = Cli::try_parse_from(["volleycut", "settings", "set", "autoTag.proxyEnabled", "false"])
            .unwrap();
        match cli.command {
            Commands::Settings {
                action: SettingsAction::Set { key, value },
            } => {
                assert_eq!(key, "autoTag.proxyEnabled");
                assert_eq!(value, "false");
            }
            _ => panic!("expected settings set"),
        }
    }
}
