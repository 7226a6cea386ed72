//! Clip Store
//!
//! Saved clips, most recent first. Clips are only ever added or re-tagged;
//! there is no delete or reorder operation.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::labels::Label;
use crate::types::{format_timecode, ClipId, TimeSec};
use crate::{CoreError, CoreResult};

// =============================================================================
// Clip
// =============================================================================

/// A saved time range with an action label
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clip {
    pub id: ClipId,
    /// Start time in seconds
    pub start: TimeSec,
    /// End time in seconds (always greater than `start`)
    pub end: TimeSec,
    pub tag: Label,
}

impl Clip {
    /// Creates a clip with a fresh id, validating the range
    pub fn new(start: TimeSec, end: TimeSec, tag: Label) -> CoreResult<Self> {
        if !start.is_finite() || !end.is_finite() || start < 0.0 || end <= start {
            return Err(CoreError::InvalidTimeRange(start, end));
        }

        Ok(Self {
            id: ulid::Ulid::new().to_string(),
            start,
            end,
            tag,
        })
    }

    /// Clip duration in seconds
    pub fn duration(&self) -> TimeSec {
        self.end - self.start
    }

    /// Human-readable range, e.g. `00:10.000 → 00:12.500`
    pub fn range_label(&self) -> String {
        format!(
            "{} → {}",
            format_timecode(self.start),
            format_timecode(self.end)
        )
    }
}

// =============================================================================
// Clip Store
// =============================================================================

/// Ordered clip collection (most recent first)
#[derive(Clone, Debug, Default)]
pub struct ClipStore {
    clips: Vec<Clip>,
}

impl ClipStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a clip at the front of the list
    pub fn add(&mut self, clip: Clip) {
        debug!("Adding clip {} ({})", clip.id, clip.range_label());
        self.clips.insert(0, clip);
    }

    /// Replaces the tag of a single clip without reordering
    pub fn update_tag(&mut self, clip_id: &str, tag: Label) -> CoreResult<()> {
        let clip = self
            .clips
            .iter_mut()
            .find(|clip| clip.id == clip_id)
            .ok_or_else(|| CoreError::ClipNotFound(clip_id.to_string()))?;

        debug!("Re-tagging clip {}: {} -> {}", clip.id, clip.tag, tag);
        clip.tag = tag;
        Ok(())
    }

    /// Gets a clip by id
    pub fn get(&self, clip_id: &str) -> Option<&Clip> {
        self.clips.iter().find(|clip| clip.id == clip_id)
    }

    /// Gets a clip by list position (0 = most recent)
    pub fn get_index(&self, index: usize) -> Option<&Clip> {
        self.clips.get(index)
    }

    /// Clips in display order
    pub fn iter(&self) -> impl Iterator<Item = &Clip> {
        self.clips.iter()
    }

    /// Clips as a slice in display order
    pub fn as_slice(&self) -> &[Clip] {
        &self.clips
    }

    /// Clip ids in display order
    pub fn ids(&self) -> Vec<ClipId> {
        self.clips.iter().map(|clip| clip.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    /// Drops every clip. Only a new source or a session reset does this.
    pub(crate) fn clear(&mut self) {
        self.clips.clear();
    }

    /// Exports the full list as pretty-printed JSON
    pub fn export_json(&self) -> CoreResult<String> {
        Ok(serde_json::to_string_pretty(&self.clips)?)
    }
}
