//! Timetable source response DTOs.
//!
//! These types map directly to the station timetable JSON returned by the
//! Transport API. Optional fields use `Option` because the API omits or nulls
//! them freely.

use serde::{Deserialize, Deserializer, Serialize};

/// Response from `GET /{station}/timetable.json`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimetableBoard {
    /// Reference date of the board, "YYYY-MM-DD".
    pub date: String,

    /// Reference time-of-day of the board, "HH:MM".
    pub time_of_day: String,

    /// CRS code of the station.
    pub station_code: String,

    /// Human-readable station name.
    #[serde(default)]
    pub station_name: Option<String>,

    /// Services calling at the station from the reference time onwards.
    pub departures: Departures,
}

/// Wrapper around the list of calling services.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Departures {
    #[serde(default)]
    pub all: Vec<DepartureItem>,
}

/// One service calling at the board's station.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DepartureItem {
    /// Service code. Sent as a string or a number depending on the operator.
    #[serde(default, deserialize_with = "string_or_number")]
    pub service: Option<String>,

    /// Schedule UID; identifies the physical service across stations.
    pub train_uid: String,

    /// Scheduled departure "HH:MM", null when the service terminates here.
    #[serde(default)]
    pub aimed_departure_time: Option<String>,

    /// Scheduled arrival "HH:MM", null when the service starts here.
    #[serde(default)]
    pub aimed_arrival_time: Option<String>,

    #[serde(default)]
    pub platform: Option<String>,

    #[serde(default)]
    pub operator: Option<String>,

    #[serde(default)]
    pub origin_name: Option<String>,

    #[serde(default)]
    pub destination_name: Option<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    }))
}
