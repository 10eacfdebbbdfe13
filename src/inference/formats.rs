//! String formats recognised in event fields
//!
//! Schedule values (dates, start times, timestamps) must also be real
//! calendar values, so `2024-02-30` or `25:00` stay plain strings. Contact
//! and ticket fields only get a shape check.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Format advertised through the JSON Schema `format` keyword
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Format {
    /// Calendar day, `YYYY-MM-DD`
    Date,
    /// Timestamp with a `T` or space separator, offset optional
    DateTime,
    /// Wall-clock time such as doors or start, `HH:MM[:SS]`
    Time,
    /// Organizer contact
    Email,
    /// Ticket or venue link
    Uri,
}

impl Format {
    pub fn keyword(self) -> &'static str {
        match self {
            Format::Date => "date",
            Format::DateTime => "date-time",
            Format::Time => "time",
            Format::Email => "email",
            Format::Uri => "uri",
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.keyword())
    }
}

const LOCAL_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];
const TIME_FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M"];

// chrono accepts single-digit fields, the shapes pin ISO widths
static ISO_DATE_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}").unwrap());
static CLOCK_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{2}:\d{2}(:\d{2}(\.\d+)?)?$").unwrap());

static EMAIL_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap());
static LINK_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?://[^\s/$.?#][^\s]*$").unwrap());

/// Detect the format of a string value, `None` for free text
pub fn detect_format(value: &str) -> Option<Format> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    schedule_format(value).or_else(|| {
        if EMAIL_SHAPE.is_match(value) {
            Some(Format::Email)
        } else if LINK_SHAPE.is_match(value) {
            Some(Format::Uri)
        } else {
            None
        }
    })
}

fn schedule_format(value: &str) -> Option<Format> {
    if ISO_DATE_PREFIX.is_match(value) {
        if value.len() == 10 {
            return NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .map(|_| Format::Date);
        }
        let is_datetime = DateTime::parse_from_rfc3339(value).is_ok()
            || LOCAL_DATETIME_FORMATS
                .iter()
                .any(|f| NaiveDateTime::parse_from_str(value, f).is_ok());
        return is_datetime.then_some(Format::DateTime);
    }
    if CLOCK_SHAPE.is_match(value) {
        let is_time = TIME_FORMATS
            .iter()
            .any(|f| NaiveTime::parse_from_str(value, f).is_ok());
        return is_time.then_some(Format::Time);
    }
    None
}
