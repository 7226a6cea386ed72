//! VolleyCut Core Type Definitions
//!
//! Defines fundamental types used throughout the project.

// =============================================================================
// ID Types
// =============================================================================

/// Clip unique identifier (ULID)
pub type ClipId = String;

// =============================================================================
// Time Types
// =============================================================================

/// Time in seconds (floating point)
pub type TimeSec = f64;

/// Formats a time as `mm:ss.mmm`.
///
/// Minutes are not wrapped into hours; milliseconds are truncated.
pub fn format_timecode(t: TimeSec) -> String {
    let t = if t.is_finite() { t.max(0.0) } else { 0.0 };
    let minutes = (t / 60.0).floor() as u64;
    let seconds = (t % 60.0).floor() as u64;
    let millis = ((t % 1.0) * 1000.0).floor() as u64;
    format!("{:02}:{:02}.{:03}", minutes, seconds, millis)
}

/// Clamps a time into `[0, max]`. NaN collapses to zero.
pub fn clamp_time(t: TimeSec, max: TimeSec) -> TimeSec {
    if t.is_nan() {
        return 0.0;
    }
    let max = if max.is_finite() { max.max(0.0) } else { 0.0 };
    t.clamp(0.0, max)
}
