//! User Notifications
//!
//! Transient, non-blocking notices broadcast to whatever front end is
//! attached. Every user-visible outcome (and every failure) goes through here.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Notice capacity before slow subscribers start lagging
const NOTICE_CHANNEL_CAPACITY: usize = 64;

/// Notice severity
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Info,
    /// Neutral progress message
    Message,
    Error,
}

/// A single notification
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

/// Broadcasts notices to subscribers
#[derive(Clone, Debug)]
pub struct Notifier {
    tx: broadcast::Sender<Notice>,
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Subscribes to future notices
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }

    pub fn success(&self, text: impl Into<String>) {
        self.emit(NoticeLevel::Success, text.into());
    }

    pub fn info(&self, text: impl Into<String>) {
        self.emit(NoticeLevel::Info, text.into());
    }

    pub fn message(&self, text: impl Into<String>) {
        self.emit(NoticeLevel::Message, text.into());
    }

    pub fn error(&self, text: impl Into<String>) {
        self.emit(NoticeLevel::Error, text.into());
    }

    fn emit(&self, level: NoticeLevel, text: String) {
        match level {
            NoticeLevel::Error => warn!(notice = %text, "error notice"),
            NoticeLevel::Message => debug!(notice = %text, "message notice"),
            _ => info!(notice = %text, "notice"),
        }

        // No subscribers is fine; notices are fire-and-forget.
        let _ = self.tx.send(Notice { level, text });
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}
