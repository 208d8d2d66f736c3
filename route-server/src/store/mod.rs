//! Interval store and timetable row persistence.
//!
//! Every station keeps a set of non-overlapping, non-touching intervals of
//! absolute time that are known to be fully downloaded, and the timetable
//! rows fetched for them. Each row belongs to exactly one interval. Merging a
//! new window coalesces every interval it overlaps or touches into one and
//! re-homes their rows, as a single atomic step.
//!
//! Two backends implement [`TimetableStore`]: [`SqliteStore`] for persistence
//! and [`MemoryStore`] for tests and ephemeral runs.

mod memory;
mod merge;
mod sqlite;

use std::future::Future;

use crate::domain::{Crs, Interval, NewEntry, TimeField, TimetableEntry, Timestamp};

pub use memory::{IdGen, MemoryStore, StationTable};
pub use merge::{MergePlan, plan_merge};
pub use sqlite::SqliteStore;

/// Errors from the timetable store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database query or connection failed
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row could not be mapped back to domain types
    #[error("corrupt stored row: {0}")]
    Corrupt(String),

    /// The window passed to a merge is malformed
    #[error("invalid window: {0}")]
    InvalidWindow(String),
}

/// Result of a cache read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// A single stored interval covers the whole range; these are all the
    /// entries in it, ordered by the requested field.
    Complete(Vec<TimetableEntry>),

    /// Part of the range has not been downloaded.
    Incomplete,
}

impl Lookup {
    /// Returns the entries if the range was fully covered.
    pub fn complete(self) -> Option<Vec<TimetableEntry>> {
        match self {
            Lookup::Complete(entries) => Some(entries),
            Lookup::Incomplete => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Lookup::Complete(_))
    }
}

/// Repository over cached intervals and timetable rows.
pub trait TimetableStore {
    /// The interval whose `[start, stop)` contains `t`.
    fn find_containing(
        &self,
        station: Crs,
        t: Timestamp,
    ) -> impl Future<Output = Result<Option<Interval>, StoreError>> + Send;

    /// All intervals lying entirely within `[t0, t1]`.
    fn find_fully_inside(
        &self,
        station: Crs,
        t0: Timestamp,
        t1: Timestamp,
    ) -> impl Future<Output = Result<Vec<Interval>, StoreError>> + Send;

    /// All intervals of a station, ordered by start.
    fn intervals(
        &self,
        station: Crs,
    ) -> impl Future<Output = Result<Vec<Interval>, StoreError>> + Send;

    /// Entries whose `field` lies in `[t0, t1]`, if one interval covers the
    /// whole range.
    fn read(
        &self,
        station: Crs,
        t0: Timestamp,
        t1: Timestamp,
        field: TimeField,
    ) -> impl Future<Output = Result<Lookup, StoreError>> + Send;

    /// Absorb the rows of a freshly downloaded window `[t0, t_max]`, returning
    /// the interval now covering it.
    fn merge(
        &self,
        station: Crs,
        t0: Timestamp,
        t_max: Timestamp,
        rows: Vec<NewEntry>,
    ) -> impl Future<Output = Result<Interval, StoreError>> + Send;
}
