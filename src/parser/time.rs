//! Timestamp layouts shared by the parsers
//!
//! Layouts are chrono strftime strings. All times without an explicit offset
//! are taken as UTC; results are epoch milliseconds.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};

/// A timestamp layout to try
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeLayout {
    /// RFC 3339, with or without fractional seconds
    Rfc3339,
    /// strftime layout
    Format(&'static str),
}

/// Syslog-style layout without a year; the current UTC year is assumed
pub const YEARLESS: &str = "%b %d %H:%M:%S";

/// Layouts tried by the plain parser, in order
pub const PLAIN_LAYOUTS: [TimeLayout; 5] = [
    TimeLayout::Format("%Y-%m-%d %H:%M:%S"),
    TimeLayout::Format("%Y/%m/%d %H:%M:%S"),
    TimeLayout::Format("%m/%d/%Y %H:%M:%S"),
    TimeLayout::Format(YEARLESS),
    TimeLayout::Format("%Y-%m-%dT%H:%M:%S"),
];

/// Layouts tried for JSON string timestamps
pub const JSON_LAYOUTS: [TimeLayout; 5] = [
    TimeLayout::Rfc3339,
    TimeLayout::Format("%Y-%m-%d %H:%M:%S"),
    TimeLayout::Format("%Y-%m-%dT%H:%M:%S"),
    TimeLayout::Format("%Y/%m/%d %H:%M:%S"),
    TimeLayout::Format(YEARLESS),
];

/// Fallback layouts for regex-captured timestamps
pub const REGEX_LAYOUTS: [TimeLayout; 6] = [
    TimeLayout::Rfc3339,
    TimeLayout::Format("%Y-%m-%d %H:%M:%S"),
    TimeLayout::Format("%Y-%m-%dT%H:%M:%S"),
    TimeLayout::Format("%Y/%m/%d %H:%M:%S"),
    TimeLayout::Format(YEARLESS),
    TimeLayout::Format("%Y-%m-%d %H:%M:%S%.f"),
];

/// First layout that parses `value` wins
pub fn parse_first(value: &str, layouts: &[TimeLayout]) -> Option<i64> {
    layouts.iter().find_map(|layout| match layout {
        TimeLayout::Rfc3339 => parse_rfc3339(value),
        TimeLayout::Format(format) => parse_with_format(value, format),
    })
}

pub fn parse_rfc3339(value: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.timestamp_millis())
}

/// Parse with a strftime layout.
///
/// Tries a date-time with offset, then a naive date-time (UTC), then a bare
/// date at midnight UTC. Naive parsing drops offsets, so it goes second.
pub fn parse_with_format(value: &str, format: &str) -> Option<i64> {
    let value = value.trim();

    if !has_year(format) {
        let year = Utc::now().year();
        return parse_with_format(&format!("{} {}", year, value), &format!("%Y {}", format));
    }

    if let Ok(dt) = DateTime::parse_from_str(value, format) {
        return Some(dt.timestamp_millis());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
        return Some(dt.and_utc().timestamp_millis());
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, format) {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp_millis());
    }

    None
}

fn has_year(format: &str) -> bool {
    ["%Y", "%y", "%G", "%g", "%s", "%+", "%c", "%D", "%F", "%x"]
        .iter()
        .any(|directive| format.contains(directive))
}

/// Epoch seconds (possibly fractional) to milliseconds
pub fn epoch_seconds_to_millis(seconds: f64) -> i64 {
    (seconds * 1000.0) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc3339_keeps_millis() {
        assert_eq!(parse_rfc3339("1970-01-01T00:00:01.250Z"), Some(1250));
        assert_eq!(parse_rfc3339("1970-01-01T01:00:00+01:00"), Some(0));
    }

    #[test]
    fn test_naive_layouts_are_utc() {
        assert_eq!(
            parse_first("2024-01-01 00:00:00", &PLAIN_LAYOUTS),
            Some(1_704_067_200_000)
        );
        assert_eq!(
            parse_first("01/02/2024 00:00:00", &PLAIN_LAYOUTS),
            Some(1_704_153_600_000)
        );
        assert_eq!(parse_first("not a time", &JSON_LAYOUTS), None);
    }

    #[test]
    fn test_yearless_uses_current_year() {
        let ms = parse_with_format("Dec 25 10:30:45", YEARLESS).unwrap();
        let dt = DateTime::from_timestamp_millis(ms).unwrap();
        assert_eq!(dt.year(), Utc::now().year());
        assert_eq!((dt.month(), dt.day()), (12, 25));
    }

    #[test]
    fn test_custom_formats() {
        assert_eq!(
            parse_with_format("2024-01-01 00:00:00 +0100", "%Y-%m-%d %H:%M:%S %z"),
            Some(1_704_063_600_000)
        );
        assert_eq!(parse_with_format("2024-01-01", "%Y-%m-%d"), Some(1_704_067_200_000));
        assert_eq!(
            parse_first("2024-01-01 00:00:00.125", &REGEX_LAYOUTS),
            Some(1_704_067_200_125)
        );
    }

    #[test]
    fn test_epoch_seconds() {
        assert_eq!(epoch_seconds_to_millis(1_700_000_000.5), 1_700_000_000_500);
    }
}
