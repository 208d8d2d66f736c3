//! Domain types for the route planner.
//!
//! This module contains the plain data records shared by the timetable
//! source, the interval cache and the route finder. Validated types enforce
//! their invariants at construction time.

mod entry;
mod interval;
mod station;
mod time;

pub use entry::{EntryKey, NewEntry, TimeField, TimetableEntry};
pub use interval::{Interval, IntervalId};
pub use station::{Crs, InvalidCrs};
pub use time::{
    SECONDS_IN_A_DAY, TimeError, Timestamp, parse_hhmm_seconds, time_to_seconds,
};
