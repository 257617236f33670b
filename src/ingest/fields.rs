//! Typed parsing of raw row values.

use chrono::NaiveDate;
use regex::Regex;

/// Parse a calendar date from a raw cell value.
///
/// Blank input and unparseable input both yield `None`: a date that fails to
/// parse degrades to a null field rather than failing the row. Attempts, in
/// order: a general calendar parse of the full string, then `MM/DD/YYYY`,
/// `YYYY-MM-DD`, and `MM-DD-YYYY` patterns. The first match wins.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(date) = parse_general(trimmed) {
        return Some(date);
    }

    // Pattern fallbacks, searched anywhere in the value like the formats
    // above but component-mapped per pattern.
    let slash_mdy = Regex::new(r"(\d{1,2})/(\d{1,2})/(\d{4})").expect("valid regex");
    if let Some(caps) = slash_mdy.captures(trimmed) {
        if let Some(date) = date_from_parts(&caps[3], &caps[1], &caps[2]) {
            return Some(date);
        }
    }

    let iso_ymd = Regex::new(r"(\d{4})-(\d{1,2})-(\d{1,2})").expect("valid regex");
    if let Some(caps) = iso_ymd.captures(trimmed) {
        if let Some(date) = date_from_parts(&caps[1], &caps[2], &caps[3]) {
            return Some(date);
        }
    }

    let dash_mdy = Regex::new(r"(\d{1,2})-(\d{1,2})-(\d{4})").expect("valid regex");
    if let Some(caps) = dash_mdy.captures(trimmed) {
        if let Some(date) = date_from_parts(&caps[3], &caps[1], &caps[2]) {
            return Some(date);
        }
    }

    None
}

fn parse_general(value: &str) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(value) {
        return Some(dt.date_naive());
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(value, format) {
            return Some(dt.date());
        }
    }
    None
}

fn date_from_parts(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(
        year.parse().ok()?,
        month.parse().ok()?,
        day.parse().ok()?,
    )
}
