//! Time formatting for logs and the archive manifest.

use chrono::{DateTime, FixedOffset, SecondsFormat};
use std::time::Duration;

/// Format a manifest timestamp as ISO 8601 with its UTC offset.
pub fn format_manifest_timestamp(at: &DateTime<FixedOffset>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Parse a timestamp written by [`format_manifest_timestamp`].
pub fn parse_manifest_timestamp(s: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(s.trim()).ok()
}

/// Format a duration as human-readable text (e.g., "1d 02:30:00", "01:30:00", "05:30").
pub fn format_duration(duration: Duration) -> String {
    let seconds = duration.as_secs();
    let hours = seconds / 3600;
    let mins = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours >= 24 {
        let days = hours / 24;
        let hours = hours % 24;
        format!("{}d {:02}:{:02}:{:02}", days, hours, mins, secs)
    } else if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, mins, secs)
    } else {
        format!("{:02}:{:02}", mins, secs)
    }
}
