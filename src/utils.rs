//! Common utility functions used by the CLI output.
//!
//! - [`format_remaining`] - Human-readable time left on a block
//! - [`truncate`] - Truncate strings with ellipsis

use chrono::Duration;

/// Format a remaining duration as `2h 05m`, `12m 30s` or `45s`.
/// Negative durations render as `0s`.
///
/// # Examples
/// ```
/// use chrono::Duration;
/// use skycontrol::utils::format_remaining;
/// assert_eq!(format_remaining(Duration::seconds(45)), "45s");
/// assert_eq!(format_remaining(Duration::minutes(125)), "2h 05m");
/// ```
pub fn format_remaining(d: Duration) -> String {
    let total = d.num_seconds().max(0);
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{}h {:02}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Truncate a string to a maximum length, adding "..." if truncated.
///
/// # Examples
/// ```
/// use skycontrol::utils::truncate;
/// assert_eq!(truncate("short", 10), "short");
/// assert_eq!(truncate("this is long", 10), "this is...");
/// ```
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    if max_len <= 3 {
        return ".".repeat(max_len);
    }
    let kept: String = s.chars().take(max_len - 3).collect();
    format!("{}...", kept)
}
