use std::fmt::Write;

use anyhow::anyhow;
use chrono::{Locale, NaiveDateTime};

/// Format used to check that a parsed date survives formatting at all.
pub const PROBE_FORMAT: &str = "%Y/%m-%b";

/// Look up a locale by its POSIX name (`en_US`, `de_DE`, `POSIX`, ...).
pub fn parse_locale(name: &str) -> anyhow::Result<Locale> {
    Locale::try_from(name).map_err(|_| anyhow!("unknown locale '{}'", name))
}

/// Render `date` with a strftime-style template in the given locale.
///
/// Unknown specifiers are reported as errors instead of panicking, which
/// is what `to_string()` on chrono's delayed formatter would do.
pub fn format_date(date: &NaiveDateTime, template: &str, locale: Locale) -> anyhow::Result<String> {
    let mut out = String::with_capacity(template.len() + 8);
    write!(out, "{}", date.and_utc().format_localized(template, locale))
        .map_err(|_| anyhow!("invalid date format '{}'", template))?;
    Ok(out)
}
