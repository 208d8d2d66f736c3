//! Timetable rows.

use super::{Crs, IntervalId, Timestamp};

/// Which timestamp of an entry a query filters and orders by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeField {
    Departure,
    Arrival,
}

impl TimeField {
    /// Column name in the persisted `timetables` table.
    pub fn column(self) -> &'static str {
        match self {
            TimeField::Departure => "aimed_departure_timestamp",
            TimeField::Arrival => "aimed_arrival_timestamp",
        }
    }
}

/// A freshly parsed timetable row that has not been bound to an interval yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NewEntry {
    pub station: Crs,
    pub service: String,
    pub train_uid: String,
    pub departure: Option<Timestamp>,
    pub arrival: Option<Timestamp>,
}

impl NewEntry {
    /// The natural key used to collapse duplicate rows within a station.
    pub fn key(&self) -> EntryKey {
        EntryKey {
            station: self.station,
            train_uid: self.train_uid.clone(),
            departure: self.departure,
            arrival: self.arrival,
        }
    }

    /// The timestamp selected by `field`.
    pub fn time(&self, field: TimeField) -> Option<Timestamp> {
        match field {
            TimeField::Departure => self.departure,
            TimeField::Arrival => self.arrival,
        }
    }

    /// Bind this row to a stored interval.
    pub fn into_entry(self, id: i64, interval_id: IntervalId) -> TimetableEntry {
        TimetableEntry {
            id,
            station: self.station,
            service: self.service,
            train_uid: self.train_uid,
            departure: self.departure,
            arrival: self.arrival,
            interval_id,
        }
    }
}

/// Natural key of a timetable row: one scheduled stop event at a station.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryKey {
    pub station: Crs,
    pub train_uid: String,
    pub departure: Option<Timestamp>,
    pub arrival: Option<Timestamp>,
}

/// A cached timetable row, owned by exactly one interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimetableEntry {
    pub id: i64,
    pub station: Crs,
    pub service: String,
    pub train_uid: String,
    /// `None` for services terminating here.
    pub departure: Option<Timestamp>,
    /// `None` for services starting here.
    pub arrival: Option<Timestamp>,
    pub interval_id: IntervalId,
}

impl TimetableEntry {
    /// The natural key of this row.
    pub fn key(&self) -> EntryKey {
        EntryKey {
            station: self.station,
            train_uid: self.train_uid.clone(),
            departure: self.departure,
            arrival: self.arrival,
        }
    }

    /// The timestamp selected by `field`.
    pub fn time(&self, field: TimeField) -> Option<Timestamp> {
        match field {
            TimeField::Departure => self.departure,
            TimeField::Arrival => self.arrival,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(uid: &str, dep: Option<i64>, arr: Option<i64>) -> NewEntry {
        NewEntry {
            station: Crs::parse("KGX").unwrap(),
            service: "24745000".to_string(),
            train_uid: uid.to_string(),
            departure: dep.map(Timestamp::from_secs),
            arrival: arr.map(Timestamp::from_secs),
        }
    }

    #[test]
    fn key_ignores_service_and_id() {
        let a = row("C12345", Some(100), None);
        let mut b = a.clone();
        b.service = "other".to_string();
        assert_eq!(a.key(), b.key());

        let stored = b.into_entry(7, IntervalId(3));
        assert_eq!(stored.key(), a.key());
    }

    #[test]
    fn key_distinguishes_missing_times() {
        let a = row("C12345", Some(100), None);
        let b = row("C12345", Some(100), Some(100));
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn time_field_selection() {
        let r = row("C12345", Some(100), Some(50));
        assert_eq!(r.time(TimeField::Departure), Some(Timestamp::from_secs(100)));
        assert_eq!(r.time(TimeField::Arrival), Some(Timestamp::from_secs(50)));
        assert_eq!(TimeField::Arrival.column(), "aimed_arrival_timestamp");
    }
}
