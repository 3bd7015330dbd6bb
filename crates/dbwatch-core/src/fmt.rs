//! Shared formatting helpers for log and console output.

use std::time::Duration;

/// Format a percentage or threshold without trailing zeros.
///
/// `95.0` -> `"95"`, `94.99` -> `"94.99"`, `80.5` -> `"80.5"`
pub fn format_ratio(value: f64) -> String {
    let s = format!("{:.2}", value);
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Format a duration in milliseconds with two decimals: `"1234.50ms"`.
pub fn format_ms(ms: f64) -> String {
    format!("{:.2}ms", ms)
}

/// Format a wall-clock span compactly: `"45s"`, `"3m5s"`, `"2h10m"`, `"1d4h"`.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m{}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h{}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d{}h", secs / 86400, (secs % 86400) / 3600)
    }
}

/// First `max_chars` characters of `text` on a single line, with `...`
/// appended when something was cut.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let flat: String = text
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .collect();
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let mut cut: String = flat.chars().take(max_chars).collect();
        cut.push_str("...");
        cut
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_drops_trailing_zeros() {
        assert_eq!(format_ratio(95.0), "95");
        assert_eq!(format_ratio(94.99), "94.99");
        assert_eq!(format_ratio(80.5), "80.5");
        assert_eq!(format_ratio(0.0), "0");
    }

    #[test]
    fn ms_has_two_decimals() {
        assert_eq!(format_ms(1500.0), "1500.00ms");
        assert_eq!(format_ms(0.126), "0.13ms");
    }

    #[test]
    fn duration_compact() {
        assert_eq!(format_duration(Duration::from_secs(45)), "45s");
        assert_eq!(format_duration(Duration::from_secs(185)), "3m5s");
        assert_eq!(format_duration(Duration::from_secs(7800)), "2h10m");
        assert_eq!(format_duration(Duration::from_secs(100800)), "1d4h");
    }

    #[test]
    fn excerpt_flattens_and_cuts() {
        assert_eq!(excerpt("SELECT\n  1", 80), "SELECT   1");
        assert_eq!(excerpt("abcdef", 3), "abc...");
        assert_eq!(excerpt("abc", 3), "abc");
    }
}
