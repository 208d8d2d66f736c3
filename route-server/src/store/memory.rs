//! In-memory timetable store.
//!
//! Each station's intervals and rows live in a [`StationTable`] behind its own
//! `RwLock`: reads on a station wait for an in-progress merge to finish, while
//! merges on different stations never contend.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::{
    Crs, EntryKey, Interval, IntervalId, NewEntry, TimeField, TimetableEntry, Timestamp,
};

use super::merge::{fresh_rows, plan_merge, validate_window};
use super::{Lookup, StoreError, TimetableStore};

/// Monotonic id allocation shared by all stations of a store.
#[derive(Debug)]
pub struct IdGen {
    interval: AtomicI64,
    entry: AtomicI64,
}

impl IdGen {
    pub fn new() -> Self {
        Self {
            interval: AtomicI64::new(1),
            entry: AtomicI64::new(1),
        }
    }

    fn next_interval(&self) -> IntervalId {
        IntervalId(self.interval.fetch_add(1, Ordering::Relaxed))
    }

    fn next_entry(&self) -> i64 {
        self.entry.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for IdGen {
    fn default() -> Self {
        Self::new()
    }
}

/// Intervals and timetable rows of a single station.
#[derive(Debug)]
pub struct StationTable {
    station: Crs,
    intervals: Vec<Interval>,
    entries: Vec<TimetableEntry>,
    keys: HashSet<EntryKey>,
}

impl StationTable {
    pub fn new(station: Crs) -> Self {
        Self {
            station,
            intervals: Vec::new(),
            entries: Vec::new(),
            keys: HashSet::new(),
        }
    }

    /// Intervals ordered by start.
    pub fn intervals(&self) -> Vec<Interval> {
        let mut intervals = self.intervals.clone();
        intervals.sort_by_key(|i| i.start);
        intervals
    }

    /// All stored rows, in insertion order.
    pub fn entries(&self) -> &[TimetableEntry] {
        &self.entries
    }

    pub fn find_containing(&self, t: Timestamp) -> Option<Interval> {
        self.intervals.iter().find(|i| i.contains(t)).copied()
    }

    fn find_touching(&self, t: Timestamp) -> Option<Interval> {
        self.intervals.iter().find(|i| i.touches(t)).copied()
    }

    pub fn find_fully_inside(&self, t0: Timestamp, t1: Timestamp) -> Vec<Interval> {
        self.intervals
            .iter()
            .filter(|i| i.is_inside(t0, t1))
            .copied()
            .collect()
    }

    pub fn read(&self, t0: Timestamp, t1: Timestamp, field: TimeField) -> Lookup {
        if !self.intervals.iter().any(|i| i.covers(t0, t1)) {
            return Lookup::Incomplete;
        }

        let mut entries: Vec<TimetableEntry> = self
            .entries
            .iter()
            .filter(|e| e.time(field).is_some_and(|t| t0 <= t && t <= t1))
            .cloned()
            .collect();
        entries.sort_by(|a, b| {
            a.time(field)
                .cmp(&b.time(field))
                .then_with(|| a.train_uid.cmp(&b.train_uid))
        });
        Lookup::Complete(entries)
    }

    /// Delete the intervals in `old_ids` and insert `[start, stop)` in their
    /// place, re-pointing the rows of every deleted interval to it.
    pub fn replace(
        &mut self,
        old_ids: &[IntervalId],
        start: Timestamp,
        stop: Timestamp,
        ids: &IdGen,
    ) -> Interval {
        let interval = Interval {
            id: ids.next_interval(),
            station: self.station,
            start,
            stop,
        };

        for entry in &mut self.entries {
            if old_ids.contains(&entry.interval_id) {
                entry.interval_id = interval.id;
            }
        }
        self.intervals.retain(|i| !old_ids.contains(&i.id));
        self.intervals.push(interval);

        interval
    }

    /// Coalesce window `[t0, t_max]` with the intervals it overlaps or
    /// touches and add its rows, skipping rows already stored.
    pub fn merge(
        &mut self,
        t0: Timestamp,
        t_max: Timestamp,
        rows: Vec<NewEntry>,
        ids: &IdGen,
    ) -> Result<Interval, StoreError> {
        validate_window(self.station, t0, t_max, &rows)?;

        let plan = plan_merge(
            t0,
            t_max,
            self.find_touching(t0),
            self.find_touching(t_max),
            self.find_fully_inside(t0, t_max),
        );
        let interval = self.replace(&plan.absorbed, plan.start, plan.stop, ids);

        let fresh = fresh_rows(&mut self.keys, rows);
        debug!(
            station = %self.station,
            interval = %interval.id,
            absorbed = plan.absorbed.len(),
            inserted = fresh.len(),
            "Merged window"
        );
        for row in fresh {
            self.entries.push(row.into_entry(ids.next_entry(), interval.id));
        }

        Ok(interval)
    }
}

/// Timetable store kept entirely in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    stations: Mutex<HashMap<Crs, Arc<RwLock<StationTable>>>>,
    ids: IdGen,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, station: Crs) -> Arc<RwLock<StationTable>> {
        let mut stations = self.stations.lock().unwrap_or_else(|e| e.into_inner());
        stations
            .entry(station)
            .or_insert_with(|| Arc::new(RwLock::new(StationTable::new(station))))
            .clone()
    }

    /// All rows stored for a station.
    pub async fn entries(&self, station: Crs) -> Vec<TimetableEntry> {
        self.table(station).read().await.entries().to_vec()
    }
}

impl TimetableStore for MemoryStore {
    async fn find_containing(
        &self,
        station: Crs,
        t: Timestamp,
    ) -> Result<Option<Interval>, StoreError> {
        Ok(self.table(station).read().await.find_containing(t))
    }

    async fn find_fully_inside(
        &self,
        station: Crs,
        t0: Timestamp,
        t1: Timestamp,
    ) -> Result<Vec<Interval>, StoreError> {
        Ok(self.table(station).read().await.find_fully_inside(t0, t1))
    }

    async fn intervals(&self, station: Crs) -> Result<Vec<Interval>, StoreError> {
        Ok(self.table(station).read().await.intervals())
    }

    async fn read(
        &self,
        station: Crs,
        t0: Timestamp,
        t1: Timestamp,
        field: TimeField,
    ) -> Result<Lookup, StoreError> {
        Ok(self.table(station).read().await.read(t0, t1, field))
    }

    async fn merge(
        &self,
        station: Crs,
        t0: Timestamp,
        t_max: Timestamp,
        rows: Vec<NewEntry>,
    ) -> Result<Interval, StoreError> {
        let table = self.table(station);
        let mut table = table.write().await;
        table.merge(t0, t_max, rows, &self.ids)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn kgx() -> Crs {
        Crs::parse("KGX").unwrap()
    }

    /// A window `[start, start + len)` with departures inside it.
    fn window() -> impl Strategy<Value = (i64, i64, Vec<(u8, i64)>)> {
        (0i64..2_000, 1i64..400).prop_flat_map(|(start, len)| {
            let rows = proptest::collection::vec((0u8..6, start..start + len), 0..8);
            (Just(start), Just(len), rows)
        })
    }

    fn rows_for(rows: &[(u8, i64)]) -> Vec<NewEntry> {
        rows.iter()
            .map(|(uid, secs)| NewEntry {
                station: kgx(),
                service: String::new(),
                train_uid: format!("U{uid}"),
                departure: Some(Timestamp::from_secs(*secs)),
                arrival: None,
            })
            .collect()
    }

    proptest! {
        /// Stored intervals never overlap or touch after any merge sequence.
        #[test]
        fn intervals_stay_disjoint(windows in proptest::collection::vec(window(), 1..12)) {
            let ids = IdGen::new();
            let mut table = StationTable::new(kgx());

            for (start, len, rows) in &windows {
                table
                    .merge(Timestamp::from_secs(*start), Timestamp::from_secs(start + len), rows_for(rows), &ids)
                    .unwrap();

                let intervals = table.intervals();
                for pair in intervals.windows(2) {
                    prop_assert!(pair[0].stop < pair[1].start, "{:?} touches {:?}", pair[0], pair[1]);
                }
                for i in &intervals {
                    prop_assert!(i.start < i.stop);
                }
            }
        }

        /// Every merged row is stored exactly once and points at a live interval.
        #[test]
        fn rows_are_conserved(windows in proptest::collection::vec(window(), 1..12)) {
            let ids = IdGen::new();
            let mut table = StationTable::new(kgx());
            let mut expected = HashSet::new();

            for (start, len, rows) in &windows {
                let rows = rows_for(rows);
                expected.extend(rows.iter().map(NewEntry::key));
                table
                    .merge(Timestamp::from_secs(*start), Timestamp::from_secs(start + len), rows, &ids)
                    .unwrap();
            }

            let stored: Vec<EntryKey> = table.entries().iter().map(TimetableEntry::key).collect();
            let unique: HashSet<EntryKey> = stored.iter().cloned().collect();
            prop_assert_eq!(stored.len(), unique.len());
            prop_assert_eq!(unique, expected);

            let live: HashSet<IntervalId> = table.intervals().iter().map(|i| i.id).collect();
            for entry in table.entries() {
                prop_assert!(live.contains(&entry.interval_id));
            }
        }

        /// Every merged window is covered after the merge.
        #[test]
        fn merged_windows_are_readable(windows in proptest::collection::vec(window(), 1..12)) {
            let ids = IdGen::new();
            let mut table = StationTable::new(kgx());

            for (start, len, rows) in &windows {
                let t0 = Timestamp::from_secs(*start);
                let t1 = Timestamp::from_secs(start + len);
                table.merge(t0, t1, rows_for(rows), &ids).unwrap();
                prop_assert!(table.read(t0, Timestamp::from_secs(start + len - 1), TimeField::Departure).is_complete());
            }
        }

        /// Merging the same window twice changes nothing.
        #[test]
        fn refetch_is_idempotent((start, len, rows) in window()) {
            let ids = IdGen::new();
            let mut table = StationTable::new(kgx());
            let t0 = Timestamp::from_secs(start);
            let t1 = Timestamp::from_secs(start + len);

            table.merge(t0, t1, rows_for(&rows), &ids).unwrap();
            let intervals = table.intervals().len();
            let entries = table.entries().len();

            table.merge(t0, t1, rows_for(&rows), &ids).unwrap();
            prop_assert_eq!(table.intervals().len(), intervals);
            prop_assert_eq!(table.entries().len(), entries);
        }
    }
}
