//! Date and time normalization
//!
//! Users and the language model describe appointment times loosely
//! ("3pm", "2:30 PM", "15:00", or a full ISO instant). These helpers turn
//! them into the forms the CRM expects and back into display strings.
//!
//! Every function is pure and returns `None` (or a placeholder string)
//! instead of panicking on malformed input.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

/// Placeholder returned by [`format_for_display`] for unparseable input
pub const INVALID_DATE: &str = "Invalid date";

static DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid regex"));

static TIME_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(\d{1,2})(?::(\d{2}))?(?::(\d{2}))?\s*([ap])\.?\s*m?\.?$|^(\d{1,2})(?::(\d{2}))(?::(\d{2}))?$|^(\d{1,2})$")
        .expect("valid regex")
});

static DISPLAY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*([a-z]+)\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+(\d{4}),?\s+(?:at\s+)?(\d{1,2}:\d{2}\s*[ap]\.?m\.?)\s*$",
    )
    .expect("valid regex")
});

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// Date and time recovered from a display string
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayParts {
    /// ISO calendar date, `YYYY-MM-DD`
    pub date: Option<String>,
    /// Raw time string as written, e.g. `3:00 PM`
    pub time: Option<String>,
}

/// Parse a full ISO-8601 instant (with offset or `Z`)
fn parse_instant(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    // Offset-less timestamps are treated as UTC
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Whether `text` is already a complete ISO instant with a zone designator
pub fn is_iso_instant(text: &str) -> bool {
    DateTime::parse_from_rfc3339(text.trim()).is_ok()
}

/// Convert a loose time token to `HH:MM:SS`
///
/// Accepts `H`, `H:MM`, `H:MM:SS`, each optionally followed by an AM/PM
/// modifier, and ISO timestamps (whose time of day is returned). Hours above
/// 23 are rejected; with a modifier the hour must be 1 to 12, so
/// `"13:00 PM"` is `None`.
pub fn to_24_hour(text: &str) -> Option<String> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if text.contains('T') {
        let instant = parse_instant(text)?;
        return Some(format!(
            "{:02}:{:02}:{:02}",
            instant.hour(),
            instant.minute(),
            instant.second()
        ));
    }

    let caps = TIME_TOKEN_RE.captures(text)?;

    // Three alternatives: with modifier, 24h with minutes, bare hour
    let (hour, minute, second, modifier) = if let Some(h) = caps.get(1) {
        (
            h.as_str(),
            caps.get(2).map(|m| m.as_str()),
            caps.get(3).map(|m| m.as_str()),
            caps.get(4).map(|m| m.as_str().to_ascii_lowercase()),
        )
    } else if let Some(h) = caps.get(5) {
        (
            h.as_str(),
            caps.get(6).map(|m| m.as_str()),
            caps.get(7).map(|m| m.as_str()),
            None,
        )
    } else {
        (caps.get(8)?.as_str(), None, None, None)
    };

    let mut hour: u32 = hour.parse().ok()?;
    let minute: u32 = minute.map_or(Some(0), |m| m.parse().ok())?;
    let second: u32 = second.map_or(Some(0), |s| s.parse().ok())?;

    if hour > 23 || minute > 59 || second > 59 {
        return None;
    }

    match modifier.as_deref() {
        Some(m) => {
            if !(1..=12).contains(&hour) {
                return None;
            }
            if m == "a" && hour == 12 {
                hour = 0;
            } else if m == "p" && hour != 12 {
                hour += 12;
            }
        }
        None => {}
    }

    Some(format!("{:02}:{:02}:{:02}", hour, minute, second))
}

/// Combine a `YYYY-MM-DD` date with a loose time into an ISO instant
///
/// A time that is already a complete ISO instant passes through unchanged.
/// Otherwise the result is `DATE + "T" + HH:MM:SS + ".000Z"`.
pub fn combine(date: &str, time: &str) -> Option<String> {
    let time = time.trim();
    if is_iso_instant(time) {
        return Some(time.to_string());
    }

    let date = date.trim();
    if !DATE_RE.is_match(date) || NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
        return None;
    }

    let time = to_24_hour(time)?;
    Some(format!("{}T{}.000Z", date, time))
}

fn ordinal_suffix(day: u32) -> &'static str {
    match (day % 10, day % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Render an ISO instant as `Month Day, Year, H:MM AM/PM` in UTC
///
/// ```
/// use bankbot_core::datetime::format_for_display;
/// assert_eq!(
///     format_for_display("2025-03-06T15:00:00.000Z"),
///     "March 6th, 2025, 3:00 PM"
/// );
/// ```
pub fn format_for_display(iso: &str) -> String {
    let Some(instant) = parse_instant(iso) else {
        return INVALID_DATE.to_string();
    };

    let month = capitalize(MONTHS[instant.month0() as usize]);
    let day = instant.day();
    let (is_pm, hour12) = instant.hour12();

    format!(
        "{} {}{}, {}, {}:{:02} {}",
        month,
        day,
        ordinal_suffix(day),
        instant.year(),
        hour12,
        instant.minute(),
        if is_pm { "PM" } else { "AM" }
    )
}

fn month_number(name: &str) -> Option<u32> {
    let name = name.to_ascii_lowercase();
    if name.len() < 3 {
        return None;
    }
    MONTHS
        .iter()
        .position(|m| m.starts_with(&name) && (name.len() == 3 || *m == name))
        .map(|idx| idx as u32 + 1)
}

/// Inverse of [`format_for_display`]
///
/// Returns both parts as `None` when the text does not look like a display
/// string or names an impossible date.
pub fn parse_display_string(text: &str) -> DisplayParts {
    let Some(caps) = DISPLAY_RE.captures(text) else {
        return DisplayParts::default();
    };

    let parsed = (|| {
        let month = month_number(caps.get(1)?.as_str())?;
        let day: u32 = caps.get(2)?.as_str().parse().ok()?;
        let year: i32 = caps.get(3)?.as_str().parse().ok()?;
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        let time = caps.get(4)?.as_str().trim().to_string();
        Some((date.format("%Y-%m-%d").to_string(), time))
    })();

    match parsed {
        Some((date, time)) => DisplayParts {
            date: Some(date),
            time: Some(time),
        },
        None => DisplayParts::default(),
    }
}
