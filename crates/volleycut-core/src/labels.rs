//! Action Labels
//!
//! The closed set of volleyball action labels, their hotkeys, and the
//! coercion of free-text classifier output onto the set.

use serde::{Deserialize, Serialize};

/// Volleyball action label
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    #[default]
    Serve,
    Pass,
    Set,
    Attack,
    Block,
    Dig,
    Error,
}

impl Label {
    /// All labels, in matching order
    pub const ALL: [Label; 7] = [
        Label::Serve,
        Label::Pass,
        Label::Set,
        Label::Attack,
        Label::Block,
        Label::Dig,
        Label::Error,
    ];

    /// Returns the label name
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Serve => "Serve",
            Label::Pass => "Pass",
            Label::Set => "Set",
            Label::Attack => "Attack",
            Label::Block => "Block",
            Label::Dig => "Dig",
            Label::Error => "Error",
        }
    }

    /// Returns the single-character hotkey that selects this label
    pub fn hotkey(&self) -> char {
        match self {
            Label::Serve => 'S',
            Label::Pass => 'P',
            Label::Set => 'T',
            Label::Attack => 'A',
            Label::Block => 'B',
            Label::Dig => 'D',
            Label::Error => 'E',
        }
    }

    /// Looks up a label by hotkey (case-insensitive)
    pub fn from_hotkey(key: char) -> Option<Label> {
        let key = key.to_ascii_uppercase();
        Label::ALL.into_iter().find(|label| label.hotkey() == key)
    }

    /// Coerces free text onto the label set.
    ///
    /// The text is lower-cased and substring-matched against the label names
    /// in [`Label::ALL`] order; the first match wins. Text matching nothing
    /// becomes [`Label::Error`].
    pub fn from_response(text: &str) -> Label {
        let lower = text.to_lowercase();
        Label::ALL
            .into_iter()
            .find(|label| lower.contains(&label.as_str().to_lowercase()))
            .unwrap_or(Label::Error)
    }

    /// Comma-separated label names, as used in the classifier instruction
    pub fn joined_names() -> String {
        Label::ALL
            .iter()
            .map(|label| label.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Label {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase();
        Label::ALL
            .into_iter()
            .find(|label| label.as_str().to_lowercase() == needle)
            .ok_or_else(|| format!("Unknown label: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hotkeys_are_unique() {
        let mut keys: Vec<char> = Label::ALL.iter().map(|l| l.hotkey()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), Label::ALL.len());
    }

    #[test]
    fn test_from_hotkey() {
        assert_eq!(Label::from_hotkey('a'), Some(Label::Attack));
        assert_eq!(Label::from_hotkey('T'), Some(Label::Set));
        assert_eq!(Label::from_hotkey('x'), None);
        assert_eq!(Label::from_hotkey('I'), None);
    }

    #[test]
    fn test_from_response_finds_label_in_sentence() {
        assert_eq!(
            Label::from_response("I think this was a great Dig by the player"),
            Label::Dig
        );
        assert_eq!(Label::from_response("ATTACK"), Label::Attack);
        assert_eq!(Label::from_response("  block\n"), Label::Block);
    }

    #[test]
    fn test_from_response_first_label_in_order_wins() {
        // "serve" precedes "attack" in matching order
        assert_eq!(Label::from_response("attack after the serve"), Label::Serve);
    }

    #[test]
    fn test_from_response_unrecognized_is_error() {
        assert_eq!(Label::from_response("no idea"), Label::Error);
        assert_eq!(Label::from_response(""), Label::Error);
    }

    #[test]
    fn test_from_response_always_in_label_set() {
        for text in ["", "dig", "Passing lane", "sets", "???", "Blocked shot"] {
            assert!(Label::ALL.contains(&Label::from_response(text)));
        }
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!("dig".parse::<Label>().unwrap(), Label::Dig);
        assert_eq!("Serve".parse::<Label>().unwrap(), Label::Serve);
        assert!("spike".parse::<Label>().is_err());
        assert_eq!(Label::Attack.to_string(), "Attack");
    }

    #[test]
    fn test_serializes_as_name() {
        assert_eq!(serde_json::to_string(&Label::Set).unwrap(), "\"Set\"");
        let parsed: Label = serde_json::from_str("\"Error\"").unwrap();
        assert_eq!(parsed, Label::Error);
    }

    #[test]
    fn test_joined_names() {
        assert_eq!(
            Label::joined_names(),
            "Serve, Pass, Set, Attack, Block, Dig, Error"
        );
    }
}
