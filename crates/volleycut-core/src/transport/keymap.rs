//! Keyboard bindings
//!
//! Maps a key press plus a snapshot of the current transport state onto a
//! command. Resolution is pure; the snapshot is taken fresh by the caller on
//! every key press.

use serde::{Deserialize, Serialize};

use crate::labels::Label;
use crate::types::TimeSec;

/// Seconds moved by the arrow keys
pub const SEEK_STEP: TimeSec = 5.0;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Key {
    Space,
    ArrowLeft,
    ArrowRight,
    Char(char),
    Other(String),
}

/// A key press
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyInput {
    pub key: Key,
    pub shift: bool,
    /// Focus is in a text field
    pub in_text_input: bool,
}

impl KeyInput {
    pub fn new(key: Key) -> Self {
        Self {
            key,
            shift: false,
            in_text_input: false,
        }
    }

    pub fn shifted(key: Key) -> Self {
        Self {
            key,
            shift: true,
            in_text_input: false,
        }
    }
}

/// Transport state as of the key press
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KeyContext {
    pub position: TimeSec,
    pub active_tag: Label,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum KeyCommand {
    TogglePlay,
    MarkIn(TimeSec),
    MarkOut(TimeSec),
    SaveClip(Label),
    SeekRelative(TimeSec),
    SelectTag(Label),
}

/// Resolves a key press to a command
pub fn resolve(input: &KeyInput, ctx: &KeyContext) -> Option<KeyCommand> {
    if input.in_text_input {
        return None;
    }

    match &input.key {
        Key::Space => Some(KeyCommand::TogglePlay),
        Key::ArrowLeft => Some(KeyCommand::SeekRelative(-SEEK_STEP)),
        Key::ArrowRight => Some(KeyCommand::SeekRelative(SEEK_STEP)),
        Key::Char(c) => match c.to_ascii_uppercase() {
            'I' => Some(KeyCommand::MarkIn(ctx.position)),
            'O' => Some(KeyCommand::MarkOut(ctx.position)),
            // Shift+S saves; it does not also select Serve
            'S' if input.shift => Some(KeyCommand::SaveClip(ctx.active_tag)),
            other => Label::from_hotkey(other).map(KeyCommand::SelectTag),
        },
        Key::Other(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> KeyContext {
        KeyContext {
            position: 42.0,
            active_tag: Label::Attack,
        }
    }

    #[test]
    fn test_transport_keys() {
        assert_eq!(
            resolve(&KeyInput::new(Key::Space), &ctx()),
            Some(KeyCommand::TogglePlay)
        );
        assert_eq!(
            resolve(&KeyInput::new(Key::ArrowLeft), &ctx()),
            Some(KeyCommand::SeekRelative(-5.0))
        );
        assert_eq!(
            resolve(&KeyInput::new(Key::ArrowRight), &ctx()),
            Some(KeyCommand::SeekRelative(5.0))
        );
    }

    #[test]
    fn test_marks_use_snapshot_position() {
        assert_eq!(
            resolve(&KeyInput::new(Key::Char('i')), &ctx()),
            Some(KeyCommand::MarkIn(42.0))
        );
        assert_eq!(
            resolve(&KeyInput::new(Key::Char('O')), &ctx()),
            Some(KeyCommand::MarkOut(42.0))
        );
    }

    #[test]
    fn test_shift_s_only_saves() {
        assert_eq!(
            resolve(&KeyInput::shifted(Key::Char('S')), &ctx()),
            Some(KeyCommand::SaveClip(Label::Attack))
        );
        assert_eq!(
            resolve(&KeyInput::new(Key::Char('s')), &ctx()),
            Some(KeyCommand::SelectTag(Label::Serve))
        );
    }

    #[test]
    fn test_label_hotkeys_select_tag() {
        for label in Label::ALL {
            let key = label.hotkey().to_ascii_lowercase();
            assert_eq!(
                resolve(&KeyInput::new(Key::Char(key)), &ctx()),
                Some(KeyCommand::SelectTag(label))
            );
        }
        assert_eq!(
            resolve(&KeyInput::shifted(Key::Char('D')), &ctx()),
            Some(KeyCommand::SelectTag(Label::Dig))
        );
    }

    #[test]
    fn test_ignored_keys() {
        let mut typing = KeyInput::new(Key::Space);
        typing.in_text_input = true;
        assert_eq!(resolve(&typing, &ctx()), None);

        assert_eq!(resolve(&KeyInput::new(Key::Char('x')), &ctx()), None);
        assert_eq!(
            resolve(&KeyInput::new(Key::Other("Escape".to_string())), &ctx()),
            None
        );
    }
}
