//! Session input parsing
//!
//! One stdin line is either a key press or a `:`-prefixed command.

use volleycut_core::transport::{Key, KeyInput};

/// A clip reference: 1-based list position or clip id
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClipRef {
    Index(usize),
    Id(String),
}

impl ClipRef {
    fn parse(text: &str) -> Self {
        match text.parse::<usize>() {
            Ok(index) => ClipRef::Index(index),
            Err(_) => ClipRef::Id(text.to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SessionCommand {
    Load(String),
    Reset,
    PlayClip(ClipRef),
    Seek(f64),
    AutoTag(ClipRef),
    AutoTagAll,
    Clips,
    Export,
    Status,
    Help,
    Quit,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SessionInput {
    Empty,
    Key(KeyInput),
    Command(SessionCommand),
}

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum InputError {
    #[error("Unknown key: {0}")]
    UnknownKey(String),

    #[error("Unknown command: :{0}")]
    UnknownCommand(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Invalid number: {0}")]
    InvalidNumber(String),
}

pub const HELP: &str = "\
Keys:
  space            play / pause
  i / o            mark in / mark out
  shift+s          save clip with the active tag
  left / right     seek -5s / +5s
  s p t a b d e    select tag (Serve Pass Set Attack Block Dig Error)
Commands:
  :load <file|url> load a local video or YouTube link
  :reset           unload and clear the session
  :play <clip>     play a saved clip (list number or id)
  :seek <seconds>  jump to a position
  :auto <clip>     auto-tag a clip
  :auto-all        auto-tag every clip
  :clips           list clips
  :export          copy clips JSON to the clipboard
  :status          show playback state
  :help            show this help
  :quit            exit";

pub fn parse_line(line: &str) -> Result<SessionInput, InputError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(SessionInput::Empty);
    }

    match line.strip_prefix(':') {
        Some(command) => parse_command(command).map(SessionInput::Command),
        None => parse_key(line).map(SessionInput::Key),
    }
}

fn parse_key(text: &str) -> Result<KeyInput, InputError> {
    let lower = text.to_ascii_lowercase();
    let (shift, name) = match lower.strip_prefix("shift+") {
        Some(rest) => (true, rest),
        None => (false, lower.as_str()),
    };

    let key = match name {
        "space" => Key::Space,
        "left" => Key::ArrowLeft,
        "right" => Key::ArrowRight,
        _ => {
            let mut chars = name.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Key::Char(c),
                _ => return Err(InputError::UnknownKey(text.to_string())),
            }
        }
    };

    let mut input = KeyInput::new(key);
    input.shift = shift;
    Ok(input)
}

fn parse_command(text: &str) -> Result<SessionCommand, InputError> {
    let text = text.trim();
    let (name, arg) = match text.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (text, ""),
    };

    let command = match name {
        "load" | "l" => {
            if arg.is_empty() {
                return Err(InputError::Usage(":load <file|url>"));
            }
            SessionCommand::Load(arg.to_string())
        }
        "reset" => SessionCommand::Reset,
        "play" => {
            if arg.is_empty() {
                return Err(InputError::Usage(":play <clip>"));
            }
            SessionCommand::PlayClip(ClipRef::parse(arg))
        }
        "seek" => {
            let seconds = arg
                .parse::<f64>()
                .ok()
                .filter(|s| s.is_finite())
                .ok_or_else(|| InputError::InvalidNumber(arg.to_string()))?;
            SessionCommand::Seek(seconds)
        }
        "auto" => {
            if arg.is_empty() {
                return Err(InputError::Usage(":auto <clip>"));
            }
            SessionCommand::AutoTag(ClipRef::parse(arg))
        }
        "auto-all" => SessionCommand::AutoTagAll,
        "clips" | "ls" => SessionCommand::Clips,
        "export" => SessionCommand::Export,
        "status" => SessionCommand::Status,
        "help" | "h" | "?" => SessionCommand::Help,
        "quit" | "q" | "exit" => SessionCommand::Quit,
        other => return Err(InputError::UnknownCommand(other.to_string())),
    };

    Ok(command)
}
