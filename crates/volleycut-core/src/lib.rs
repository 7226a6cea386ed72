//! VolleyCut Core
//!
//! Volleyball clip marking engine.
//! Handles playback of local files and YouTube links, in/out marking, the
//! clip list, and AI auto-tagging of saved clips.

pub mod autotag;
pub mod clips;
pub mod credentials;
pub mod ffmpeg;
pub mod labels;
pub mod notify;
pub mod playback;
pub mod settings;
pub mod transport;

// Re-export common types
mod types;
pub use types::*;

mod error;
pub use error::*;

pub use clips::{Clip, ClipStore};
pub use labels::Label;
pub use notify::{Notice, NoticeLevel, Notifier};
pub use transport::Transport;
