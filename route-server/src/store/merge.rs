//! Interval coalescing shared by the store backends.
//!
//! A merge takes a freshly downloaded window `[t0, t_max]` and the stored
//! intervals it overlaps or touches, and produces the bounds of the single
//! interval that replaces them all.

use std::collections::HashSet;

use crate::domain::{Crs, EntryKey, Interval, IntervalId, NewEntry, Timestamp};

use super::StoreError;

/// Outcome of planning a merge: the bounds of the surviving interval and the
/// stored intervals it absorbs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePlan {
    pub start: Timestamp,
    pub stop: Timestamp,
    pub absorbed: Vec<IntervalId>,
}

/// Plan the coalescing of window `[t0, t_max]`.
///
/// `left` and `right` are the intervals touching `t0` and `t_max` (boundary
/// equality counts as touching), `middle` the intervals lying entirely within
/// the window.
pub fn plan_merge(
    t0: Timestamp,
    t_max: Timestamp,
    left: Option<Interval>,
    right: Option<Interval>,
    middle: Vec<Interval>,
) -> MergePlan {
    let start = left.map_or(t0, |l| l.start.min(t0));
    let stop = right.map_or(t_max, |r| r.stop.max(t_max));

    let mut absorbed: Vec<IntervalId> = left
        .into_iter()
        .chain(right)
        .chain(middle)
        .map(|i| i.id)
        .collect();
    absorbed.sort();
    absorbed.dedup();

    MergePlan {
        start,
        stop,
        absorbed,
    }
}

/// Check a window before merging it.
pub fn validate_window(
    station: Crs,
    t0: Timestamp,
    t_max: Timestamp,
    rows: &[NewEntry],
) -> Result<(), StoreError> {
    if t_max <= t0 {
        return Err(StoreError::InvalidWindow(format!(
            "window for {station} ends at {t_max}, not after its start {t0}"
        )));
    }
    if let Some(row) = rows.iter().find(|r| r.station != station) {
        return Err(StoreError::InvalidWindow(format!(
            "row for {} ({}) in a window for {station}",
            row.station, row.train_uid
        )));
    }
    Ok(())
}

/// Drop rows already stored or repeated within `rows`, keeping first
/// occurrences in order. `known` is extended with the keys kept.
pub fn fresh_rows(known: &mut HashSet<EntryKey>, rows: Vec<NewEntry>) -> Vec<NewEntry> {
    rows.into_iter().filter(|r| known.insert(r.key())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crs() -> Crs {
        Crs::parse("KGX").unwrap()
    }

    fn t(s: i64) -> Timestamp {
        Timestamp::from_secs(s)
    }

    fn interval(id: i64, start: i64, stop: i64) -> Interval {
        Interval {
            id: IntervalId(id),
            station: crs(),
            start: t(start),
            stop: t(stop),
        }
    }

    fn row(uid: &str, dep: i64) -> NewEntry {
        NewEntry {
            station: crs(),
            service: String::new(),
            train_uid: uid.to_string(),
            departure: Some(t(dep)),
            arrival: None,
        }
    }

    #[test]
    fn standalone_window() {
        let plan = plan_merge(t(100), t(200), None, None, vec![]);
        assert_eq!(plan.start, t(100));
        assert_eq!(plan.stop, t(200));
        assert!(plan.absorbed.is_empty());
    }

    #[test]
    fn extends_over_left_and_right() {
        let left = interval(1, 0, 150);
        let right = interval(2, 180, 400);
        let plan = plan_merge(t(100), t(200), Some(left), Some(right), vec![]);
        assert_eq!((plan.start, plan.stop), (t(0), t(400)));
        assert_eq!(plan.absorbed, vec![IntervalId(1), IntervalId(2)]);
    }

    #[test]
    fn same_interval_on_both_sides_is_absorbed_once() {
        let both = interval(5, 0, 1000);
        let plan = plan_merge(t(100), t(200), Some(both), Some(both), vec![both]);
        assert_eq!((plan.start, plan.stop), (t(0), t(1000)));
        assert_eq!(plan.absorbed, vec![IntervalId(5)]);
    }

    #[test]
    fn middle_intervals_are_absorbed() {
        let plan = plan_merge(
            t(0),
            t(1000),
            None,
            None,
            vec![interval(3, 100, 200), interval(4, 300, 400)],
        );
        assert_eq!((plan.start, plan.stop), (t(0), t(1000)));
        assert_eq!(plan.absorbed, vec![IntervalId(3), IntervalId(4)]);
    }

    #[test]
    fn rejects_empty_or_foreign_windows() {
        assert!(validate_window(crs(), t(10), t(10), &[]).is_err());

        let mut foreign = row("C1", 10);
        foreign.station = Crs::parse("YRK").unwrap();
        assert!(validate_window(crs(), t(0), t(100), &[foreign]).is_err());

        assert!(validate_window(crs(), t(0), t(100), &[row("C1", 10)]).is_ok());
    }

    #[test]
    fn fresh_rows_deduplicates() {
        let mut known = HashSet::new();
        known.insert(row("C1", 10).key());

        let rows = vec![row("C1", 10), row("C2", 20), row("C2", 20), row("C3", 30)];
        let fresh = fresh_rows(&mut known, rows);

        let uids: Vec<_> = fresh.iter().map(|r| r.train_uid.as_str()).collect();
        assert_eq!(uids, vec!["C2", "C3"]);
        assert_eq!(known.len(), 3);
    }
}
