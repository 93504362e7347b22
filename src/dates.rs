//! Calendar dates are stored as the instant at UTC midnight of the same
//! (year, month, day), whatever clock the caller picked them under. "Feb 5"
//! therefore reads back as Feb 5 in every timezone.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::error::{AppError, AppResult};

/// Map a calendar date to its canonical storage instant (UTC 00:00:00.000).
pub fn to_storage_instant(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Same as [`to_storage_instant`], keeping the wall-clock calendar day of a
/// zoned timestamp and discarding its offset.
pub fn local_to_storage_instant<Tz: TimeZone>(local: &DateTime<Tz>) -> DateTime<Utc> {
    to_storage_instant(local.date_naive())
}

/// Inverse of [`to_storage_instant`]: the UTC calendar day of a stored instant.
pub fn from_storage_instant(instant: DateTime<Utc>) -> NaiveDate {
    instant.date_naive()
}

pub fn storage_instant_from_ymd(year: i32, month: u32, day: u32) -> AppResult<DateTime<Utc>> {
    NaiveDate::from_ymd_opt(year, month, day)
        .map(to_storage_instant)
        .ok_or_else(|| AppError::InvalidDate(format!("{year:04}-{month:02}-{day:02}")))
}

/// Parse user input into a calendar date.
///
/// Accepts `YYYY-MM-DD`, or an RFC 3339 timestamp whose calendar day is taken
/// in its own offset.
pub fn parse_calendar_date(input: &str) -> AppResult<NaiveDate> {
    let trimmed = input.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date);
    }
    DateTime::parse_from_rfc3339(trimmed)
        .map(|dt| dt.date_naive())
        .map_err(|_| AppError::InvalidDate(input.to_string()))
}
