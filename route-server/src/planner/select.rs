//! Connection selection for a single leg.
//!
//! Departures at the origin are joined with arrivals at the destination on
//! `train_uid`. A pair only counts when the train reaches the destination
//! after leaving the origin.

use std::collections::HashMap;

use crate::domain::{TimetableEntry, Timestamp};

/// A train calling at both ends of a leg, in the right order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub train_uid: String,
    pub departure: Timestamp,
    pub arrival: Timestamp,
}

/// Inner join of departure and arrival rows on `train_uid`.
pub fn join_connections(
    departures: &[TimetableEntry],
    arrivals: &[TimetableEntry],
) -> Vec<Connection> {
    let mut arrivals_by_train: HashMap<&str, Vec<Timestamp>> = HashMap::new();
    for entry in arrivals {
        if let Some(arrival) = entry.arrival {
            arrivals_by_train
                .entry(entry.train_uid.as_str())
                .or_default()
                .push(arrival);
        }
    }

    departures
        .iter()
        .filter_map(|entry| Some((entry, entry.departure?)))
        .flat_map(|(entry, departure)| {
            arrivals_by_train
                .get(entry.train_uid.as_str())
                .into_iter()
                .flatten()
                .filter(move |&&arrival| arrival > departure)
                .map(move |&arrival| Connection {
                    train_uid: entry.train_uid.clone(),
                    departure,
                    arrival,
                })
        })
        .collect()
}

/// The earliest-arriving connection, ties broken by earliest departure.
pub fn best_connection<'a>(
    connections: impl IntoIterator<Item = &'a Connection>,
) -> Option<&'a Connection> {
    connections
        .into_iter()
        .min_by(|a, b| a.arrival.cmp(&b.arrival).then(a.departure.cmp(&b.departure)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Crs, IntervalId};

    fn entry(uid: &str, dep: Option<i64>, arr: Option<i64>) -> TimetableEntry {
        TimetableEntry {
            id: 0,
            station: Crs::parse("KGX").unwrap(),
            service: String::new(),
            train_uid: uid.to_string(),
            departure: dep.map(Timestamp::from_secs),
            arrival: arr.map(Timestamp::from_secs),
            interval_id: IntervalId(1),
        }
    }

    #[test]
    fn earliest_arrival_wins() {
        let departures = [entry("X1", Some(1000), None), entry("X2", Some(1100), None)];
        let arrivals = [entry("X1", None, Some(1500)), entry("X2", None, Some(1400))];

        let connections = join_connections(&departures, &arrivals);
        assert_eq!(connections.len(), 2);

        let best = best_connection(&connections).unwrap();
        assert_eq!(best.train_uid, "X2");
        assert_eq!(best.departure, Timestamp::from_secs(1100));
        assert_eq!(best.arrival, Timestamp::from_secs(1400));
    }

    #[test]
    fn arrival_tie_broken_by_departure() {
        let departures = [entry("X1", Some(1100), None), entry("X2", Some(1000), None)];
        let arrivals = [entry("X1", None, Some(1500)), entry("X2", None, Some(1500))];

        let connections = join_connections(&departures, &arrivals);
        assert_eq!(best_connection(&connections).unwrap().train_uid, "X2");
    }

    #[test]
    fn trains_not_calling_at_both_ends_are_ignored() {
        let departures = [entry("X1", Some(1000), None), entry("X3", Some(900), None)];
        let arrivals = [entry("X1", None, Some(1500)), entry("X4", None, Some(1100))];

        let connections = join_connections(&departures, &arrivals);
        assert_eq!(connections.len(), 1);
        assert_eq!(connections[0].train_uid, "X1");
    }

    #[test]
    fn arrival_must_follow_departure() {
        // Calls at the destination first, so it runs the other way.
        let departures = [entry("X1", Some(1500), None)];
        let arrivals = [entry("X1", None, Some(1000))];

        assert!(join_connections(&departures, &arrivals).is_empty());
    }

    #[test]
    fn rows_without_the_needed_time_are_skipped() {
        let departures = [entry("X1", None, Some(900))];
        let arrivals = [entry("X1", Some(1500), None)];

        assert!(join_connections(&departures, &arrivals).is_empty());
        assert!(best_connection(&[]).is_none());
    }
}
