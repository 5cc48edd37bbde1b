use chrono::{Datelike, Locale, NaiveDate, NaiveDateTime, TimeDelta};
use regex::Regex;
use std::sync::LazyLock;

use crate::format::{format_date, PROBE_FORMAT};
use crate::metadata::TagValue;

/// Splits a time token from its trailing offset: `HH:MM:SS+HH:MM`.
static OFFSET_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[+\-Z]").unwrap());

/// Hour used when a tag only carries a date.
const DEFAULT_HOUR: u32 = 12;

/// One raw tag value and what the parser made of it.
#[derive(Debug, Clone, PartialEq)]
pub struct TimestampCandidate {
    pub tag_name: String,
    pub raw_value: TagValue,
    /// Parsed value, offset already applied. `None` when the value was rejected.
    pub parsed: Option<NaiveDateTime>,
}

impl TimestampCandidate {
    /// Parse a tag value. List values contribute their first element only.
    pub fn from_tag(tag_name: &str, raw_value: &TagValue) -> Self {
        let parsed = raw_value.first_text().and_then(|s| parse_exif_date(&s));
        Self {
            tag_name: tag_name.to_string(),
            raw_value: raw_value.clone(),
            parsed,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.parsed.is_some()
    }
}

/// Parse an EXIF-style timestamp.
///
/// Accepted layouts:
/// - `YYYY:MM:DD` (time defaults to 12:00:00)
/// - `YYYY:MM:DD HH:MM[:SS[.fff]]`
/// - `YYYY:MM:DD HH:MM:SS+HH:MM`, `...-HH:MM` or `...Z`
///
/// A `+HH:MM` offset is subtracted from the local time and a `-HH:MM`
/// offset is added, so offsets move the value toward UTC. `Z` leaves the
/// value as it is. Anything malformed yields `None`.
pub fn parse_exif_date(raw: &str) -> Option<NaiveDateTime> {
    let mut tokens = raw.split_whitespace();
    let date_token = tokens.next()?;
    let time_token = tokens.next();

    // A dot means a bare time (`12:30:45.12`) ended up where a date belongs.
    if date_token.contains('.') {
        return None;
    }
    let groups: Vec<&str> = date_token.split([':', '-']).collect();
    let [year, month, day] = groups.as_slice() else {
        return None;
    };
    if year.chars().all(|c| c == '0') {
        return None;
    }
    let year: i32 = year.parse().ok()?;
    let month: u32 = month.parse().ok()?;
    let day: u32 = day.parse().ok()?;

    let (mut hour, mut minute, mut second) = (DEFAULT_HOUR, 0, 0);
    let mut offset = None;

    if let Some(time) = time_token {
        let (clock, zone) = match OFFSET_RE.find(time) {
            Some(m) => {
                let rest = &time[m.end()..];
                let zone = rest.split(['+', '-', 'Z']).next().unwrap_or("");
                (&time[..m.start()], Some((m.as_str(), zone)))
            }
            None => (time, None),
        };

        match clock.split(':').collect::<Vec<_>>().as_slice() {
            [h, m, s] => {
                hour = h.parse().ok()?;
                minute = m.parse().ok()?;
                second = s.split('.').next()?.parse().ok()?;
            }
            [h, m] => {
                hour = h.parse().ok()?;
                minute = m.parse().ok()?;
            }
            _ => {}
        }

        if let Some((sign, zone)) = zone {
            if let [zh, zm] = zone.split(':').collect::<Vec<_>>().as_slice() {
                let hours: i64 = zh.parse().ok()?;
                let minutes: i64 = zm.parse().ok()?;
                let span = TimeDelta::try_hours(hours)?.checked_add(&TimeDelta::try_minutes(minutes)?)?;
                offset = match sign {
                    "+" => Some(-span),
                    "-" => Some(span),
                    _ => None,
                };
            }
        }
    }

    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    if !(1..=9999).contains(&date.year()) {
        return None;
    }
    let date_time = date.and_hms_opt(hour, minute, second)?;

    // Folder names are built from this later; reject anything that cannot be rendered.
    format_date(&date_time, PROBE_FORMAT, Locale::POSIX).ok()?;

    match offset {
        Some(delta) => date_time.checked_add_signed(delta),
        None => Some(date_time),
    }
}
