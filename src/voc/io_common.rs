// Cell- and header-level primitives shared by the readers.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

/// Cleans a raw header name: NBSP, newlines and tabs become spaces,
/// runs of whitespace collapse to one space, ends are trimmed.
pub fn clean_colname(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| match c {
            '\u{00a0}' | '\n' | '\r' | '\t' => ' ',
            c => c,
        })
        .collect();
    replaced.split_whitespace().collect::<Vec<&str>>().join(" ")
}

/// Trims a cell and normalizes the blank/"nan"/"none" sentinels to None.
pub fn clean_cell(raw: &str) -> Option<String> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    let lower = s.to_lowercase();
    if lower == "nan" || lower == "none" {
        return None;
    }
    Some(s.to_string())
}

// Excel serial dates count days from this epoch (the 1900 date system,
// with its compatibility offset already folded in).
fn excel_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1899, 12, 30).unwrap()
}

/// Converts an Excel serial date/datetime number to a timestamp.
pub fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 || serial > 2_958_465.0 {
        return None;
    }
    let days = serial.floor() as i64;
    let secs = ((serial - serial.floor()) * 86_400.0).round() as i64;
    let date = excel_epoch().checked_add_signed(Duration::days(days))?;
    let time = NaiveTime::from_num_seconds_from_midnight_opt(secs.min(86_399) as u32, 0)?;
    Some(date.and_time(time))
}

/// Converts a fractional-day numeric (0.5 = noon) to a time of day.
pub fn fractional_day_to_time(f: f64) -> Option<NaiveTime> {
    if !f.is_finite() || !(0.0..1.0).contains(&f) {
        return None;
    }
    let secs = (f * 86_400.0).round() as u32;
    NaiveTime::from_num_seconds_from_midnight_opt(secs.min(86_399), 0)
}

/// Lenient time-of-day parse: `HH:MM:SS`, `HH:MM`, or a fractional-day
/// numeric rendered as text.
pub fn parse_time_lenient(raw: &str) -> Option<NaiveTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    for fmt in ["%H:%M:%S", "%H:%M"] {
        if let Ok(t) = NaiveTime::parse_from_str(s, fmt) {
            return Some(t);
        }
    }
    if let Ok(f) = s.parse::<f64>() {
        return fractional_day_to_time(f);
    }
    None
}

// The formats seen in the upstream exports, most specific first.
const DATETIME_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%Y.%m.%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];
const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%Y%m%d", "%m/%d/%Y"];

/// Lenient timestamp parse over the known export formats, falling back
/// to Excel serial numbers. Returns None instead of failing: rows with
/// an unparseable date are dropped, never file-fatal.
pub fn parse_date_lenient(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(d) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    if let Ok(f) = s.parse::<f64>() {
        // Serial numbers below 1.0 are pure times, not dates.
        if f >= 1.0 {
            return excel_serial_to_datetime(f);
        }
    }
    None
}
