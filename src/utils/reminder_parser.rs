//! Reminder time parser.
//!
//! Understands three Russian phrasings, tried in this order:
//!
//! - `напомни <текст> в DD.MM HH:MM` (absolute, rolled to next year if already past)
//! - `напомни <текст> через [N] минут|часов|дней` (relative, N defaults to 1)
//! - `напомни <текст> завтра в HH:MM`
//!
//! Wall-clock times are read in the caller's fixed UTC offset.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use thiserror::Error;
use tracing::error;

/// Longest accepted reminder text, in characters.
pub const MAX_PAYLOAD_CHARS: usize = 500;

/// How far ahead a reminder may be scheduled.
pub const MAX_AHEAD_DAYS: i64 = 365;

/// Grace period for times that are just behind `now`.
pub const PAST_TOLERANCE_SECS: i64 = 60;

fn compile(pattern: &str) -> Option<Regex> {
    Regex::new(pattern)
        .map_err(|e| error!("Invalid reminder pattern {}: {}", pattern, e))
        .ok()
}

static ABSOLUTE: Lazy<Option<Regex>> = Lazy::new(|| {
    compile(r"(?is)^\s*напомни\s+(.+?)\s+в\s+(\d{1,2})\.(\d{1,2})\s+(\d{1,2}):(\d{2})\b")
});

static RELATIVE: Lazy<Option<Regex>> = Lazy::new(|| {
    compile(r"(?is)^\s*напомни\s+(.+?)\s+через\s+(?:(\d+)\s+)?(минуты|минуту|минут|часов|часа|час|дней|дня|день)\b")
});

static TOMORROW: Lazy<Option<Regex>> =
    Lazy::new(|| compile(r"(?is)^\s*напомни\s+(.+?)\s+завтра\s+в\s+(\d{1,2}):(\d{2})\b"));

/// A successfully parsed reminder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReminder {
    pub payload: String,
    pub fire_at: DateTime<Utc>,
}

/// Why a reminder was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("no known reminder pattern")]
    NoPattern,

    #[error("invalid date or time")]
    InvalidDateTime,

    #[error("reminder text is empty")]
    EmptyPayload,

    #[error("reminder text is longer than 500 characters")]
    PayloadTooLong,

    #[error("reminder is more than a year ahead")]
    TooFarAhead,

    #[error("reminder time is in the past")]
    InPast,
}

/// Rejected reminder text together with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason} in {input:?}")]
pub struct ParseError {
    pub input: String,
    pub reason: ParseErrorKind,
}

/// Parse a reminder request relative to `now`.
pub fn parse(text: &str, now: DateTime<FixedOffset>) -> Result<ParsedReminder, ParseError> {
    let fail = |reason| ParseError {
        input: text.to_string(),
        reason,
    };

    let (payload, fire_at) = match_patterns(text, now).map_err(fail)?;

    let payload = payload.trim();
    if payload.is_empty() {
        return Err(fail(ParseErrorKind::EmptyPayload));
    }
    if payload.chars().count() > MAX_PAYLOAD_CHARS {
        return Err(fail(ParseErrorKind::PayloadTooLong));
    }

    let now_utc = now.with_timezone(&Utc);
    if fire_at > now_utc + Duration::days(MAX_AHEAD_DAYS) {
        return Err(fail(ParseErrorKind::TooFarAhead));
    }
    if fire_at < now_utc - Duration::seconds(PAST_TOLERANCE_SECS) {
        return Err(fail(ParseErrorKind::InPast));
    }

    Ok(ParsedReminder {
        payload: payload.to_string(),
        fire_at,
    })
}

/// First matching pattern wins.
fn match_patterns(text: &str, now: DateTime<FixedOffset>) -> Result<(String, DateTime<Utc>), ParseErrorKind> {
    if let Some(caps) = captures(&ABSOLUTE, text) {
        return absolute(&caps, now).map(|at| (caps[1].to_string(), at));
    }
    if let Some(caps) = captures(&RELATIVE, text) {
        return relative(&caps, now).map(|at| (caps[1].to_string(), at));
    }
    if let Some(caps) = captures(&TOMORROW, text) {
        return tomorrow(&caps, now).map(|at| (caps[1].to_string(), at));
    }
    Err(ParseErrorKind::NoPattern)
}

fn captures<'t>(pattern: &Lazy<Option<Regex>>, text: &'t str) -> Option<Captures<'t>> {
    pattern.as_ref().and_then(|re| re.captures(text))
}

fn number(caps: &Captures<'_>, group: usize) -> Result<u32, ParseErrorKind> {
    caps.get(group)
        .and_then(|m| m.as_str().parse().ok())
        .ok_or(ParseErrorKind::InvalidDateTime)
}

fn clock(caps: &Captures<'_>, hour: usize, minute: usize) -> Result<NaiveTime, ParseErrorKind> {
    NaiveTime::from_hms_opt(number(caps, hour)?, number(caps, minute)?, 0).ok_or(ParseErrorKind::InvalidDateTime)
}

fn local(date: NaiveDate, time: NaiveTime, offset: &FixedOffset) -> Result<DateTime<Utc>, ParseErrorKind> {
    offset
        .from_local_datetime(&date.and_time(time))
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or(ParseErrorKind::InvalidDateTime)
}

fn absolute(caps: &Captures<'_>, now: DateTime<FixedOffset>) -> Result<DateTime<Utc>, ParseErrorKind> {
    let day = number(caps, 2)?;
    let month = number(caps, 3)?;
    let time = clock(caps, 4, 5)?;
    let offset = now.offset();

    let date = NaiveDate::from_ymd_opt(now.year(), month, day).ok_or(ParseErrorKind::InvalidDateTime)?;
    let fire_at = local(date, time, offset)?;
    if fire_at >= now.with_timezone(&Utc) {
        return Ok(fire_at);
    }

    let next_year = NaiveDate::from_ymd_opt(now.year() + 1, month, day).ok_or(ParseErrorKind::InvalidDateTime)?;
    local(next_year, time, offset)
}

fn relative(caps: &Captures<'_>, now: DateTime<FixedOffset>) -> Result<DateTime<Utc>, ParseErrorKind> {
    let amount = match caps.get(2) {
        Some(m) => m.as_str().parse::<i64>().map_err(|_| ParseErrorKind::TooFarAhead)?,
        None => 1,
    };
    let unit = caps[3].to_lowercase();

    let step = if unit.starts_with("мин") {
        Duration::try_minutes(amount)
    } else if unit.starts_with("час") {
        Duration::try_hours(amount)
    } else {
        Duration::try_days(amount)
    }
    .ok_or(ParseErrorKind::TooFarAhead)?;

    now.with_timezone(&Utc)
        .checked_add_signed(step)
        .ok_or(ParseErrorKind::TooFarAhead)
}

fn tomorrow(caps: &Captures<'_>, now: DateTime<FixedOffset>) -> Result<DateTime<Utc>, ParseErrorKind> {
    let time = clock(caps, 2, 3)?;
    let date = now.date_naive().succ_opt().ok_or(ParseErrorKind::InvalidDateTime)?;
    local(date, time, now.offset())
}
