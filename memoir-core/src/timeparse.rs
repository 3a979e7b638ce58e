//! Human date-expression parsing.
//!
//! Resolves expressions such as `"2 months"`, `"next year"`,
//! `"2023-05-01 15:00 PST"` or `"now"` into absolute UTC instants, relative
//! to an optional reference instant. Used by the expiration policy to turn
//! configured expressions into expiry instants.

use chrono::{DateTime, Duration, Months, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::TimeParseError;

/// Relative offsets: a quantity followed by a unit, e.g. `90s`, `1.5 hours`,
/// `2 months`. Seconds through weeks accept fractional quantities; months
/// and years are calendar-aware and integral.
static RELATIVE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^([\d.]+)\s*(seconds|second|secs|sec|s|minutes|minute|mins|min|m|hours|hour|hrs|hr|h|days|day|d|weeks|week|w|months|month|years|year|y)$",
    )
    .expect("relative pattern is valid")
});

/// Absolute date-times carrying a timezone abbreviation. Seconds are
/// optional (`15:00 PST` and `15:00:00 PST` both resolve).
static TZ_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(\d{4}-\d{2}-\d{2}[ t]\d{2}:\d{2}(?::\d{2})?)\s+(pst|pdt|est|edt|cst|cdt|mst|mdt|ast|adt|utc|gmt)$",
    )
    .expect("timezone pattern is valid")
});

/// Fixed table of timezone abbreviations to UTC offsets in hours.
fn tz_offset_hours(abbr: &str) -> Option<i64> {
    match abbr {
        "pst" => Some(-8),
        "pdt" | "mst" => Some(-7),
        "mdt" | "cst" => Some(-6),
        "cdt" | "est" => Some(-5),
        "edt" | "ast" => Some(-4),
        "adt" => Some(-3),
        "utc" | "gmt" => Some(0),
        _ => None,
    }
}

/// Parse a date expression into an absolute UTC instant.
///
/// Relative expressions and named keywords resolve against `reference`
/// (defaulting to the current time). Absolute expressions without timezone
/// information are assumed to be UTC. Unrecognized input fails with
/// [`TimeParseError::Unparseable`].
pub fn parse_date_string(
    expression: &str,
    reference: Option<DateTime<Utc>>,
) -> Result<DateTime<Utc>, TimeParseError> {
    let reference = reference.unwrap_or_else(Utc::now);
    let expr = expression.trim().to_lowercase();

    if expr == "now" {
        return Ok(reference);
    }

    if let Some(caps) = RELATIVE_RE.captures(&expr) {
        let quantity: f64 = caps[1].parse().map_err(|_| unparseable(expression))?;
        return relative_offset(reference, quantity, &caps[2]).ok_or_else(|| unparseable(expression));
    }

    match expr.as_str() {
        "tomorrow" => return Ok(reference + Duration::days(1)),
        "next week" => return Ok(reference + Duration::weeks(1)),
        "next month" => {
            return reference
                .checked_add_months(Months::new(1))
                .ok_or_else(|| unparseable(expression))
        }
        "next year" => {
            return reference
                .checked_add_months(Months::new(12))
                .ok_or_else(|| unparseable(expression))
        }
        _ => {}
    }

    if let Some(caps) = TZ_RE.captures(&expr) {
        let offset_hours = tz_offset_hours(&caps[2]).ok_or_else(|| unparseable(expression))?;
        let local = parse_naive(&caps[1]).ok_or_else(|| unparseable(expression))?;
        // The abbreviation gives the local offset from UTC; subtract it to
        // normalize.
        let utc = local - Duration::hours(offset_hours);
        return Ok(Utc.from_utc_datetime(&utc));
    }

    parse_absolute(&expr).ok_or_else(|| unparseable(expression))
}

fn unparseable(input: &str) -> TimeParseError {
    TimeParseError::Unparseable {
        input: input.to_string(),
    }
}

/// Apply a quantity of the given unit to the reference instant.
fn relative_offset(reference: DateTime<Utc>, quantity: f64, unit: &str) -> Option<DateTime<Utc>> {
    let seconds = |factor: f64| {
        Duration::try_milliseconds((quantity * factor * 1000.0).round() as i64)
            .map(|d| reference + d)
    };
    match unit {
        "s" | "sec" | "secs" | "second" | "seconds" => seconds(1.0),
        "m" | "min" | "mins" | "minute" | "minutes" => seconds(60.0),
        "h" | "hr" | "hrs" | "hour" | "hours" => seconds(3600.0),
        "d" | "day" | "days" => seconds(86_400.0),
        "w" | "week" | "weeks" => seconds(604_800.0),
        "month" | "months" => reference.checked_add_months(Months::new(quantity as u32)),
        "y" | "year" | "years" => {
            reference.checked_add_months(Months::new((quantity as u32).checked_mul(12)?))
        }
        _ => None,
    }
}

/// Parse `YYYY-MM-DD[ T]HH:MM[:SS]` without timezone information. The
/// caller lowercases expressions, so the separator may arrive as `t`.
fn parse_naive(text: &str) -> Option<NaiveDateTime> {
    let text = text.replace(['T', 't'], " ");
    NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M"))
        .ok()
}

/// Common absolute formats: RFC 3339, then date-time and date-only forms
/// assumed to be UTC.
fn parse_absolute(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Some(naive) = parse_naive(text) {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%m/%d/%Y") {
        return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
    }
    None
}
