use crate::grid::CellValue;
use chrono::{Duration, NaiveDate, NaiveDateTime};

/// Spreadsheet serial numbers count days from this epoch (the 1900 leap-year
/// bug is absorbed by starting two days early).
const SERIAL_EPOCH: (i32, u32, u32) = (1899, 12, 30);

/// Serial values outside this window are treated as plain numbers, not dates.
const SERIAL_MIN: f64 = 30_000.0;
const SERIAL_MAX: f64 = 70_000.0;

/// Explicit formats tried in order before giving up on a date string.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%d-%m-%Y",
    "%d/%m/%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%Y/%m/%d",
    "%m/%d/%y",
    "%d/%m/%y",
    "%y-%m-%d",
    "%m.%d.%Y",
    "%d.%m.%Y",
    "%Y.%m.%d",
];

/// Last-resort formats for timestamp-shaped strings.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

fn serial_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(SERIAL_EPOCH.0, SERIAL_EPOCH.1, SERIAL_EPOCH.2)
        .unwrap_or(NaiveDate::MIN)
}

/// Interpret a cell as a calendar date, if any reading makes sense.
pub fn parse_date(value: &CellValue) -> Option<NaiveDate> {
    match value {
        CellValue::Date(d) => Some(*d),
        CellValue::DateTime(dt) => Some(dt.date()),
        CellValue::Number(n) => parse_serial(*n),
        CellValue::Text(s) => parse_date_str(s),
        _ => None,
    }
}

/// A spreadsheet serial number in the plausible window maps to a date.
pub fn parse_serial(serial: f64) -> Option<NaiveDate> {
    if serial > SERIAL_MIN && serial < SERIAL_MAX {
        serial_epoch().checked_add_signed(Duration::days(serial as i64))
    } else {
        None
    }
}

/// Try the explicit format list, then timestamp fallbacks.
pub fn parse_date_str(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    // A bare serial number sometimes arrives as text.
    if let Ok(n) = s.parse::<f64>() {
        return parse_serial(n);
    }
    None
}

/// Normalize any date representation to `MM/DD/YYYY`. Unparseable input
/// degrades to the trimmed original string; this never fails, so two source
/// representations of the same day always compare equal downstream.
pub fn normalize_date(value: &CellValue) -> String {
    match parse_date(value) {
        Some(d) => d.format("%m/%d/%Y").to_string(),
        None => value.to_display(),
    }
}

pub fn normalize_date_str(raw: &str) -> String {
    match parse_date_str(raw) {
        Some(d) => d.format("%m/%d/%Y").to_string(),
        None => raw.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_matches_string_representation() {
        // Serial 45000 and 3/15/2023 are the same calendar day.
        let from_serial = normalize_date(&CellValue::Number(45000.0));
        let from_string = normalize_date_str("3/15/2023");
        assert_eq!(from_serial, "03/15/2023");
        assert_eq!(from_serial, from_string);
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let inputs = ["2024-03-01", "03/01/2024", "Mar 1, 2024", "45000", "garbage"];
        for input in inputs {
            let once = normalize_date_str(input);
            let twice = normalize_date_str(&once);
            assert_eq!(once, twice, "not idempotent for {input}");
        }
    }

    #[test]
    fn test_format_coverage() {
        assert_eq!(normalize_date_str("2024-03-01"), "03/01/2024");
        assert_eq!(normalize_date_str("March 1, 2024"), "03/01/2024");
        assert_eq!(normalize_date_str("3/1/24"), "03/01/2024");
        assert_eq!(normalize_date_str("2024.03.01"), "03/01/2024");
        assert_eq!(normalize_date_str("2024-03-01 14:30:00"), "03/01/2024");
    }

    #[test]
    fn test_unparseable_passes_through_trimmed() {
        assert_eq!(normalize_date_str("  TBD  "), "TBD");
        assert_eq!(normalize_date(&CellValue::Empty), "");
    }

    #[test]
    fn test_serial_window_bounds() {
        // Numbers outside the window are not dates.
        assert_eq!(parse_serial(100.0), None);
        assert_eq!(parse_serial(80_000.0), None);
        assert!(parse_serial(45_000.0).is_some());
    }

    #[test]
    fn test_native_date_values() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(normalize_date(&CellValue::Date(d)), "03/01/2024");
        let dt = d.and_hms_opt(9, 30, 0).unwrap();
        assert_eq!(normalize_date(&CellValue::DateTime(dt)), "03/01/2024");
    }
}
