//! Duration parsing utilities.
//!
//! This module parses interval strings given on the command line
//! (e.g., "500ms", "2s", "1m") into [`Duration`] values.

use std::time::Duration;

/// Parse an interval string (e.g., "500ms", "2s", "1.5", "1m") into a `Duration`
///
/// Supports various formats:
/// - Raw seconds, fractional allowed: "2", "0.5"
/// - Milliseconds: "500ms", "500msec"
/// - Seconds: "2s", "2sec", "2secs", "2second", "2seconds"
/// - Minutes: "1m", "1min", "1mins", "1minute", "1minutes"
///
/// Zero and negative intervals are rejected.
///
/// # Examples
/// ```
/// use gameopt::utils::duration::parse_interval;
/// use std::time::Duration;
///
/// assert_eq!(parse_interval("2"), Ok(Duration::from_secs(2)));
/// assert_eq!(parse_interval("500ms"), Ok(Duration::from_millis(500)));
/// assert!(parse_interval("fast").is_err());
/// ```
pub fn parse_interval(interval: &str) -> Result<Duration, String> {
    let interval = interval.trim();
    let (number, unit) = split_number_part(interval);

    let value: f64 = number
        .parse()
        .map_err(|_| format!("Invalid interval format: {}", interval))?;
    if !value.is_finite() || value <= 0.0 {
        return Err(format!("Interval must be positive: {}", interval));
    }

    // Check milliseconds before seconds, "ms" also ends with "s"
    let seconds = match unit.trim() {
        "ms" | "msec" | "msecs" => value / 1000.0,
        "" | "s" | "sec" | "secs" | "second" | "seconds" => value,
        "m" | "min" | "mins" | "minute" | "minutes" => value * 60.0,
        _ => return Err(format!("Invalid interval format: {}", interval)),
    };

    let duration = Duration::try_from_secs_f64(seconds)
        .map_err(|_| format!("Interval out of range: {}", interval))?;
    // Sub-nanosecond values round down to zero
    if duration.is_zero() {
        return Err(format!("Interval must be positive: {}", interval));
    }
    Ok(duration)
}

/// Split a string into its leading numeric part and the unit suffix
fn split_number_part(interval: &str) -> (&str, &str) {
    for (i, c) in interval.char_indices() {
        if !c.is_ascii_digit() && c != '.' {
            return (&interval[..i], &interval[i..]);
        }
    }
    (interval, "")
}
