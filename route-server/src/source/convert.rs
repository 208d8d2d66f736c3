//! Conversion from timetable DTOs to cache rows.
//!
//! Board times are "HH:MM" strings relative to the board's reference date and
//! time-of-day. Each is turned into an absolute [`Timestamp`]: midnight of the
//! reference date in the configured timezone plus the time-of-day seconds,
//! rolled over to the next day when earlier than the reference time.

use chrono::NaiveDate;
use chrono_tz::Tz;
use tracing::warn;

use crate::domain::{
    Crs, NewEntry, TimeError, Timestamp, parse_hhmm_seconds, time_to_seconds,
};

use super::types::{DepartureItem, TimetableBoard};

/// Error during DTO to row conversion.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConversionError {
    /// Failed to parse the board's station code
    #[error("invalid CRS code: {0}")]
    InvalidCrs(String),

    /// Failed to parse the board's reference date
    #[error("invalid date: {0}")]
    InvalidDate(String),

    /// Failed to parse a time string
    #[error("invalid time {value:?}: {source}")]
    InvalidTime { value: String, source: TimeError },
}

/// Convert a station board into timetable rows.
///
/// Items with unparseable times are logged and skipped rather than failing
/// the whole board. Items with neither a departure nor an arrival time carry
/// no information and are dropped.
pub fn convert_board(board: &TimetableBoard, tz: Tz) -> Result<Vec<NewEntry>, ConversionError> {
    let station = Crs::parse(&board.station_code)
        .map_err(|_| ConversionError::InvalidCrs(board.station_code.clone()))?;

    let date = NaiveDate::parse_from_str(&board.date, "%Y-%m-%d")
        .map_err(|_| ConversionError::InvalidDate(board.date.clone()))?;

    let ref_secs =
        parse_hhmm_seconds(&board.time_of_day).map_err(|e| ConversionError::InvalidTime {
            value: board.time_of_day.clone(),
            source: e,
        })?;

    let midnight = Timestamp::local_midnight(date, tz).map_err(|e| ConversionError::InvalidTime {
        value: board.date.clone(),
        source: e,
    })?;

    let mut rows = Vec::with_capacity(board.departures.all.len());

    for item in &board.departures.all {
        match convert_item(item, station, midnight, ref_secs) {
            Ok(Some(row)) => rows.push(row),
            Ok(None) => {}
            Err(e) => {
                warn!(
                    station = %station,
                    train_uid = %item.train_uid,
                    error = %e,
                    "Skipping timetable item"
                );
            }
        }
    }

    Ok(rows)
}

/// Convert a single item; `Ok(None)` when it has no usable times.
fn convert_item(
    item: &DepartureItem,
    station: Crs,
    midnight: Timestamp,
    ref_secs: i64,
) -> Result<Option<NewEntry>, ConversionError> {
    let absolute = |value: &Option<String>| -> Result<Option<Timestamp>, ConversionError> {
        value
            .as_deref()
            .map(|s| {
                time_to_seconds(s, ref_secs)
                    .map(|secs| Timestamp::from_secs(midnight.secs() + secs))
                    .map_err(|e| ConversionError::InvalidTime {
                        value: s.to_string(),
                        source: e,
                    })
            })
            .transpose()
    };

    let departure = absolute(&item.aimed_departure_time)?;
    let arrival = absolute(&item.aimed_arrival_time)?;

    if departure.is_none() && arrival.is_none() {
        return Ok(None);
    }

    Ok(Some(NewEntry {
        station,
        service: item.service.clone().unwrap_or_default(),
        train_uid: item.train_uid.clone(),
        departure,
        arrival,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SECONDS_IN_A_DAY;
    use crate::source::types::Departures;

    fn item(uid: &str, dep: Option<&str>, arr: Option<&str>) -> DepartureItem {
        DepartureItem {
            service: Some("24745000".to_string()),
            train_uid: uid.to_string(),
            aimed_departure_time: dep.map(str::to_string),
            aimed_arrival_time: arr.map(str::to_string),
            platform: None,
            operator: None,
            origin_name: None,
            destination_name: None,
        }
    }

    fn board(time_of_day: &str, items: Vec<DepartureItem>) -> TimetableBoard {
        TimetableBoard {
            date: "1970-01-02".to_string(),
            time_of_day: time_of_day.to_string(),
            station_code: "KGX".to_string(),
            station_name: None,
            departures: Departures { all: items },
        }
    }

    #[test]
    fn converts_to_absolute_timestamps() {
        let b = board("08:00", vec![item("C1", Some("08:10"), Some("08:05"))]);
        let rows = convert_board(&b, Tz::UTC).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].station.as_str(), "KGX");
        assert_eq!(
            rows[0].departure,
            Some(Timestamp::from_secs(SECONDS_IN_A_DAY + 8 * 3600 + 600))
        );
        assert_eq!(
            rows[0].arrival,
            Some(Timestamp::from_secs(SECONDS_IN_A_DAY + 8 * 3600 + 300))
        );
    }

    #[test]
    fn times_before_reference_roll_over() {
        let b = board("23:00", vec![item("C1", Some("00:10"), None)]);
        let rows = convert_board(&b, Tz::UTC).unwrap();

        assert_eq!(
            rows[0].departure,
            Some(Timestamp::from_secs(2 * SECONDS_IN_A_DAY + 600))
        );
        assert_eq!(rows[0].arrival, None);
    }

    #[test]
    fn rows_without_times_are_dropped() {
        let b = board(
            "08:00",
            vec![item("C1", None, None), item("C2", Some("09:00"), None)],
        );
        let rows = convert_board(&b, Tz::UTC).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].train_uid, "C2");
    }

    #[test]
    fn invalid_item_times_are_skipped() {
        let b = board(
            "08:00",
            vec![item("C1", Some("8am"), None), item("C2", Some("09:00"), None)],
        );
        let rows = convert_board(&b, Tz::UTC).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].train_uid, "C2");
    }

    #[test]
    fn invalid_board_header_fails() {
        let mut b = board("08:00", vec![]);
        b.date = "15/03/2024".to_string();
        assert!(matches!(
            convert_board(&b, Tz::UTC),
            Err(ConversionError::InvalidDate(_))
        ));

        let mut b = board("08:00", vec![]);
        b.station_code = "kings cross".to_string();
        assert!(matches!(
            convert_board(&b, Tz::UTC),
            Err(ConversionError::InvalidCrs(_))
        ));

        let b = board("8:00", vec![]);
        assert!(matches!(
            convert_board(&b, Tz::UTC),
            Err(ConversionError::InvalidTime { .. })
        ));
    }

    #[test]
    fn missing_service_becomes_empty() {
        let mut i = item("C1", Some("09:00"), None);
        i.service = None;
        let rows = convert_board(&board("08:00", vec![i]), Tz::UTC).unwrap();
        assert_eq!(rows[0].service, "");
    }
}
