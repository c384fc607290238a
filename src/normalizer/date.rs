use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use crate::models::PublishedDate;

/// Date-only layouts seen in alert feeds, tried in order.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d %B %Y",
    "%d %b %Y",
    "%B %d, %Y",
    "%b %d, %Y",
];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// Interpret a raw `date_published` value.
/// Anything that is not a recognisable date string maps to the sentinel.
pub fn parse_published(value: Option<&Value>) -> PublishedDate {
    match value {
        Some(Value::String(s)) => parse_date_text(s).into(),
        _ => PublishedDate::Unknown,
    }
}

/// Parse a date string from a source feed (handles various formats).
/// Supports: RFC 3339, ISO date-times without offset (taken as UTC),
/// ISO dates, European DD/MM/YYYY, and English textual dates.
pub fn parse_date_text(text: &str) -> Option<DateTime<Utc>> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(naive.and_utc());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(trimmed, fmt) {
            return d.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn midnight(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn iso_date() {
        assert_eq!(parse_date_text("2023-01-15"), Some(midnight(2023, 1, 15)));
    }

    #[test]
    fn rfc3339_with_offset_converted_to_utc() {
        assert_eq!(
            parse_date_text("2023-01-15T01:30:00+02:00"),
            Some(Utc.with_ymd_and_hms(2023, 1, 14, 23, 30, 0).unwrap())
        );
    }

    #[test]
    fn naive_datetime_taken_as_utc() {
        assert_eq!(
            parse_date_text("2023-02-01 08:15:00"),
            Some(Utc.with_ymd_and_hms(2023, 2, 1, 8, 15, 0).unwrap())
        );
    }

    #[test]
    fn european_and_textual_dates() {
        assert_eq!(parse_date_text("15/01/2023"), Some(midnight(2023, 1, 15)));
        assert_eq!(parse_date_text("15 January 2023"), Some(midnight(2023, 1, 15)));
        assert_eq!(parse_date_text("3 Feb 2024"), Some(midnight(2024, 2, 3)));
        assert_eq!(parse_date_text("March 4, 2022"), Some(midnight(2022, 3, 4)));
    }

    #[test]
    fn impossible_date_is_unknown_not_wrong() {
        assert_eq!(parse_date_text("2023-02-30"), None);
        assert_eq!(parse_date_text("31/31/2023"), None);
    }

    #[test]
    fn garbage_and_blank_are_unknown() {
        assert_eq!(parse_date_text(""), None);
        assert_eq!(parse_date_text("   "), None);
        assert_eq!(parse_date_text("null"), None);
        assert_eq!(parse_date_text("last Tuesday"), None);
    }

    #[test]
    fn non_string_values_are_unknown() {
        assert_eq!(parse_published(None), PublishedDate::Unknown);
        assert_eq!(parse_published(Some(&json!(null))), PublishedDate::Unknown);
        assert_eq!(parse_published(Some(&json!(20230115))), PublishedDate::Unknown);
        assert_eq!(parse_published(Some(&json!(["2023-01-15"]))), PublishedDate::Unknown);
        assert_eq!(
            parse_published(Some(&json!("2023-01-15"))),
            PublishedDate::Known(midnight(2023, 1, 15))
        );
    }
}
