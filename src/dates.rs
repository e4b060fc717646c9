use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};

/// Formats seen across PJM CSV exports, feed payloads and weather APIs.
/// Tried in order; the first full match wins.
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %H:%M",
];

/// Lenient timestamp parse. Returns `None` instead of erroring so callers
/// can drop dirty rows without aborting a whole file.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim().trim_matches('"');
    for fmt in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ts);
        }
    }
    // bare date → midnight
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Lowercase three-letter month abbreviation, e.g. 11 → "nov".
pub fn month_abbr(month: u32) -> Result<String> {
    let d = NaiveDate::from_ymd_opt(2000, month, 1)
        .with_context(|| format!("invalid month: {}", month))?;
    Ok(d.format("%b").to_string().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn parses_iso_and_slashed_forms() {
        assert_eq!(
            parse_timestamp("2025-11-10 14:00:00"),
            Some(dt(2025, 11, 10, 14, 0, 0))
        );
        assert_eq!(
            parse_timestamp("2025-11-10T14:00:00"),
            Some(dt(2025, 11, 10, 14, 0, 0))
        );
        assert_eq!(
            parse_timestamp("2025-11-01T00:00"),
            Some(dt(2025, 11, 1, 0, 0, 0))
        );
        assert_eq!(
            parse_timestamp("2025/11/10 05:00:00"),
            Some(dt(2025, 11, 10, 5, 0, 0))
        );
    }

    #[test]
    fn parses_pjm_ept_clock() {
        assert_eq!(
            parse_timestamp("11/1/2025 12:00:00 AM"),
            Some(dt(2025, 11, 1, 0, 0, 0))
        );
        assert_eq!(
            parse_timestamp("11/10/2025 2:00:00 PM"),
            Some(dt(2025, 11, 10, 14, 0, 0))
        );
    }

    #[test]
    fn parses_quoted_and_bare_date() {
        assert_eq!(
            parse_timestamp("\"2025-11-10 14:00:00\""),
            Some(dt(2025, 11, 10, 14, 0, 0))
        );
        assert_eq!(
            parse_timestamp("2025-11-10"),
            Some(dt(2025, 11, 10, 0, 0, 0))
        );
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("not a date"), None);
        assert_eq!(parse_timestamp("2025-13-40 99:00:00"), None);
    }

    #[test]
    fn month_abbreviations() {
        assert_eq!(month_abbr(1).unwrap(), "jan");
        assert_eq!(month_abbr(10).unwrap(), "oct");
        assert_eq!(month_abbr(11).unwrap(), "nov");
        assert!(month_abbr(13).is_err());
    }
}
