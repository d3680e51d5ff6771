//! Connected-duration arithmetic.

/// Milliseconds elapsed since `connected_at_ms`, or zero when not connected.
///
/// Clock skew that puts `now_ms` before the stamp yields zero, never a
/// negative duration.
pub fn elapsed_ms(connected_at_ms: Option<u64>, now_ms: u64) -> u64 {
    connected_at_ms.map_or(0, |start| now_ms.saturating_sub(start))
}

/// Render a duration as zero-padded `HH:MM:SS`.
///
/// Hours are unbounded: 100 hours renders as `100:00:00`, there is no day
/// rollover.
pub fn format_hms(ms: u64) -> String {
    let total_seconds = ms / 1000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}
