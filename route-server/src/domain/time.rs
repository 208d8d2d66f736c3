//! Absolute timestamps and timetable time-of-day parsing.
//!
//! The timetable source reports times as "HH:MM" strings relative to the
//! date and time-of-day of the request. Everything stored in the cache is an
//! absolute [`Timestamp`] (seconds since the Unix epoch), so conversion happens
//! once, at parse time, using the configured timezone.

use std::fmt;
use std::ops::{Add, Sub};

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone};
use chrono_tz::Tz;

/// Number of seconds in a calendar day without DST adjustment.
pub const SECONDS_IN_A_DAY: i64 = 86_400;

/// Error returned when parsing an invalid time string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid time: {reason}")]
pub struct TimeError {
    reason: &'static str,
}

impl TimeError {
    fn new(reason: &'static str) -> Self {
        Self { reason }
    }
}

/// An absolute point in time, in whole seconds since the Unix epoch.
///
/// Missing departure or arrival times are modelled as `Option<Timestamp>`
/// rather than a sentinel value.
///
/// # Examples
///
/// ```
/// use route_server::domain::Timestamp;
/// use chrono::Duration;
///
/// let t = Timestamp::from_secs(1_000);
/// assert_eq!((t + Duration::minutes(40)).secs(), 3_400);
/// assert_eq!(Timestamp::from_secs(3_400) - t, Duration::minutes(40));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Create a timestamp from epoch seconds.
    pub const fn from_secs(secs: i64) -> Self {
        Self(secs)
    }

    /// Returns the epoch seconds.
    pub const fn secs(self) -> i64 {
        self.0
    }

    /// Resolve a local date and time in `tz` to an absolute timestamp.
    ///
    /// Ambiguous local times (DST fall-back) resolve to the earlier instant;
    /// non-existent ones (DST spring-forward gap) return `None`.
    pub fn from_local(date: NaiveDate, time: NaiveTime, tz: Tz) -> Option<Self> {
        tz.from_local_datetime(&date.and_time(time))
            .earliest()
            .map(|dt| Self(dt.timestamp()))
    }

    /// Midnight at the start of `date` in `tz`.
    pub fn local_midnight(date: NaiveDate, tz: Tz) -> Result<Self, TimeError> {
        let midnight = NaiveTime::from_hms_opt(0, 0, 0).ok_or_else(|| TimeError::new("midnight"))?;
        Self::from_local(date, midnight, tz)
            .ok_or_else(|| TimeError::new("midnight does not exist in timezone"))
    }

    /// This instant as a local date-time in `tz`.
    pub fn in_tz(self, tz: Tz) -> Option<DateTime<Tz>> {
        tz.timestamp_opt(self.0, 0).single()
    }

    /// Returns the duration between two timestamps.
    ///
    /// Negative if `other` is after `self`.
    pub fn signed_duration_since(self, other: Self) -> Duration {
        Duration::seconds(self.0 - other.0)
    }
}

impl Add<Duration> for Timestamp {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        Self(self.0.saturating_add(rhs.num_seconds()))
    }
}

impl Sub for Timestamp {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Self::Output {
        self.signed_duration_since(rhs)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parse an "HH:MM" string into seconds after midnight.
///
/// ```
/// use route_server::domain::parse_hhmm_seconds;
///
/// assert_eq!(parse_hhmm_seconds("14:20").unwrap(), 14 * 3600 + 20 * 60);
/// assert!(parse_hhmm_seconds("1420").is_err());
/// assert!(parse_hhmm_seconds("25:00").is_err());
/// ```
pub fn parse_hhmm_seconds(s: &str) -> Result<i64, TimeError> {
    if s.len() != 5 {
        return Err(TimeError::new("expected HH:MM format"));
    }

    let bytes = s.as_bytes();
    if bytes[2] != b':' {
        return Err(TimeError::new("expected colon at position 2"));
    }

    let hour =
        parse_two_digits(&bytes[0..2]).ok_or_else(|| TimeError::new("invalid hour digits"))?;
    if hour > 23 {
        return Err(TimeError::new("hour must be 0-23"));
    }

    let minute =
        parse_two_digits(&bytes[3..5]).ok_or_else(|| TimeError::new("invalid minute digits"))?;
    if minute > 59 {
        return Err(TimeError::new("minute must be 0-59"));
    }

    Ok(i64::from(hour) * 3600 + i64::from(minute) * 60)
}

/// Convert an "HH:MM" time into seconds relative to the reference day.
///
/// A board requested at time-of-day `ref_secs` lists services from that time
/// onwards, so any time earlier than the reference belongs to the following
/// day and gets one day added.
///
/// ```
/// use route_server::domain::time_to_seconds;
///
/// assert_eq!(time_to_seconds("00:10", 23 * 3600).unwrap(), 86_400 + 600);
/// assert_eq!(time_to_seconds("08:10", 0).unwrap(), 8 * 3600 + 600);
/// ```
pub fn time_to_seconds(s: &str, ref_secs: i64) -> Result<i64, TimeError> {
    let secs = parse_hhmm_seconds(s)?;
    if secs < ref_secs {
        Ok(secs + SECONDS_IN_A_DAY)
    } else {
        Ok(secs)
    }
}

/// Parse two ASCII digit bytes into a u32.
fn parse_two_digits(bytes: &[u8]) -> Option<u32> {
    if bytes.len() != 2 {
        return None;
    }
    let d1 = (bytes[0] as char).to_digit(10)?;
    let d2 = (bytes[1] as char).to_digit(10)?;
    Some(d1 * 10 + d2)
}
