//! Cached time intervals.

use std::fmt;

use super::{Crs, Timestamp};

/// Identifier of a stored interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IntervalId(pub i64);

impl fmt::Display for IntervalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A maximal span `[start, stop)` of absolute time for which a station's
/// timetable is known to be fully downloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub id: IntervalId,
    pub station: Crs,
    pub start: Timestamp,
    pub stop: Timestamp,
}

impl Interval {
    /// Whether `t` lies in `[start, stop)`.
    pub fn contains(&self, t: Timestamp) -> bool {
        self.start <= t && t < self.stop
    }

    /// Whether `t` lies in `[start, stop]`.
    ///
    /// An interval ending exactly where a new window starts touches it and
    /// must be coalesced with it.
    pub fn touches(&self, t: Timestamp) -> bool {
        self.start <= t && t <= self.stop
    }

    /// Whether the interval lies entirely within `[t0, t1]`.
    pub fn is_inside(&self, t0: Timestamp, t1: Timestamp) -> bool {
        t0 <= self.start && self.stop <= t1
    }

    /// Whether every instant of the closed range `[t0, t1]` is cached.
    pub fn covers(&self, t0: Timestamp, t1: Timestamp) -> bool {
        self.start <= t0 && t1 < self.stop
    }
}
