use std::time::Duration;

use time::{OffsetDateTime, UtcOffset};

/// Format an elapsed duration as a short human-readable string (`1h 2m 3s`, `2m 3s`, `3s`)
pub fn format_duration(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Human-readable span between two instants; negative spans count as zero
pub fn format_span(start: OffsetDateTime, end: OffsetDateTime) -> String {
    let span = end - start;
    format_duration(span.try_into().unwrap_or_default())
}

/// Convert a git signature time into an offset-aware timestamp.
///
/// Out-of-range values fall back to the Unix epoch rather than failing the crawl.
pub fn datetime_from_git(when: git2::Time) -> OffsetDateTime {
    let offset = UtcOffset::from_whole_seconds(when.offset_minutes() * 60).unwrap_or(UtcOffset::UTC);
    OffsetDateTime::from_unix_timestamp(when.seconds())
        .map(|dt| dt.to_offset(offset))
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}
