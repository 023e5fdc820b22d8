//! Formatting helpers for report output.

use chrono::{DateTime, Utc};

/// `$1.23`, or four decimals under a cent.
pub fn format_cost(usd: f64) -> String {
    if usd > 0.0 && usd < 0.01 {
        format!("${:.4}", usd)
    } else {
        format!("${:.2}", usd)
    }
}

/// `950`, `12.3K`, `4.5M`, `1.2B`.
pub fn format_tokens(tokens: i64) -> String {
    let n = tokens as f64;
    match tokens.abs() {
        t if t >= 1_000_000_000 => format!("{:.1}B", n / 1e9),
        t if t >= 1_000_000 => format!("{:.1}M", n / 1e6),
        t if t >= 1_000 => format!("{:.1}K", n / 1e3),
        _ => tokens.to_string(),
    }
}

/// `45s`, `12m 5s`, `2h 3m`; `-` when unknown.
pub fn format_duration_ms(ms: Option<i64>) -> String {
    let Some(ms) = ms else {
        return "-".to_string();
    };
    let secs = ms.max(0) / 1000;
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

/// Relative age of an RFC 3339 timestamp (e.g., "2m ago"); `never` if absent.
pub fn format_relative_time(ts: Option<&str>, now: DateTime<Utc>) -> String {
    let Some(ts) = ts.and_then(|s| DateTime::parse_from_rfc3339(s).ok()) else {
        return "never".to_string();
    };
    let duration = now.signed_duration_since(ts.with_timezone(&Utc));

    if duration.num_seconds() < 60 {
        "just now".to_string()
    } else if duration.num_minutes() < 60 {
        format!("{}m ago", duration.num_minutes())
    } else if duration.num_hours() < 24 {
        format!("{}h ago", duration.num_hours())
    } else if duration.num_days() < 7 {
        format!("{}d ago", duration.num_days())
    } else {
        ts.format("%b %d").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_cost() {
        assert_eq!(format_cost(0.0), "$0.00");
        assert_eq!(format_cost(0.0042), "$0.0042");
        assert_eq!(format_cost(12.345), "$12.35");
    }

    #[test]
    fn test_format_tokens() {
        assert_eq!(format_tokens(950), "950");
        assert_eq!(format_tokens(12_345), "12.3K");
        assert_eq!(format_tokens(4_500_000), "4.5M");
        assert_eq!(format_tokens(1_200_000_000), "1.2B");
    }

    #[test]
    fn test_format_duration_ms() {
        assert_eq!(format_duration_ms(None), "-");
        assert_eq!(format_duration_ms(Some(45_900)), "45s");
        assert_eq!(format_duration_ms(Some(725_000)), "12m 5s");
        assert_eq!(format_duration_ms(Some(7_380_000)), "2h 3m");
    }

    #[test]
    fn test_format_relative_time() {
        let now = DateTime::parse_from_rfc3339("2025-03-10T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(format_relative_time(None, now), "never");
        assert_eq!(format_relative_time(Some("garbage"), now), "never");
        assert_eq!(
            format_relative_time(Some("2025-03-10T11:59:30Z"), now),
            "just now"
        );
        assert_eq!(
            format_relative_time(Some("2025-03-10T09:00:00Z"), now),
            "3h ago"
        );
        assert_eq!(
            format_relative_time(Some("2025-01-02T00:00:00Z"), now),
            "Jan 02"
        );
    }
}
