//! Data transfer objects for web requests and responses.

use chrono::{Duration, NaiveDate, NaiveTime};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::domain::{Crs, Timestamp};
use crate::planner::{Itinerary, LegResult, RouteRequest};

/// Query for `GET /arrival_time`.
#[derive(Debug, Deserialize)]
pub struct ArrivalTimeRequest {
    /// Comma-separated CRS codes, in travel order (e.g. "KGX,PBO,YRK")
    pub stations: String,

    /// Travel date, "YYYY-MM-DD"
    pub date: String,

    /// Earliest departure, "HH:MM" local time
    pub start_time: String,

    /// Longest acceptable wait at any station, in minutes
    pub max_wait: Option<i64>,
}

impl ArrivalTimeRequest {
    /// Validate the query and resolve it against `tz`.
    ///
    /// `default_max_wait_mins` applies when no `max_wait` is given.
    pub fn to_route_request(
        &self,
        tz: Tz,
        default_max_wait_mins: i64,
    ) -> Result<RouteRequest, String> {
        let stations = self
            .stations
            .split(',')
            .map(|s| Crs::parse_normalized(s).map_err(|e| e.to_string()))
            .collect::<Result<Vec<_>, _>>()?;

        let date = NaiveDate::parse_from_str(self.date.trim(), "%Y-%m-%d")
            .map_err(|_| format!("Invalid date: {} (expected YYYY-MM-DD)", self.date))?;
        let time = NaiveTime::parse_from_str(self.start_time.trim(), "%H:%M")
            .map_err(|_| format!("Invalid start time: {} (expected HH:MM)", self.start_time))?;
        let start = Timestamp::from_local(date, time, tz)
            .ok_or_else(|| format!("{} {} does not exist in {}", self.date, self.start_time, tz))?;

        let max_wait = self.max_wait.unwrap_or(default_max_wait_mins);
        if max_wait < 0 {
            return Err(format!("Invalid max_wait: {max_wait} (must not be negative)"));
        }

        let request = RouteRequest::new(stations, start, Duration::minutes(max_wait));
        request.validate().map_err(|e| e.to_string())?;
        Ok(request)
    }
}

/// Response for `GET /arrival_time`.
#[derive(Debug, Serialize)]
pub struct ArrivalTimeResponse {
    pub summary: SummaryResult,
    pub routes: Vec<RouteLegResult>,
}

impl ArrivalTimeResponse {
    pub fn from_itinerary(itinerary: &Itinerary, tz: Tz) -> Self {
        Self {
            summary: SummaryResult {
                departure_time: format_local(itinerary.departure(), tz),
                arrival_time: format_local(itinerary.arrival(), tz),
                total_minutes: itinerary.total_duration().num_minutes(),
            },
            routes: itinerary
                .legs()
                .iter()
                .map(|leg| RouteLegResult::from_leg(leg, tz))
                .collect(),
        }
    }
}

/// Whole-route summary.
#[derive(Debug, Serialize)]
pub struct SummaryResult {
    /// First departure, "YYYY-MM-DD HH:MM"
    pub departure_time: String,

    /// Final arrival, "YYYY-MM-DD HH:MM"
    pub arrival_time: String,

    /// Minutes from first departure to final arrival
    pub total_minutes: i64,
}

/// One leg of the route.
#[derive(Debug, Serialize)]
pub struct RouteLegResult {
    pub train_uid: String,
    pub departure_station: String,
    pub destination_station: String,
    pub departure_time: String,
    pub arrival_time: String,
    pub departure_timestamp: i64,
    pub arrival_timestamp: i64,
}

impl RouteLegResult {
    pub fn from_leg(leg: &LegResult, tz: Tz) -> Self {
        Self {
            train_uid: leg.train_uid.clone(),
            departure_station: leg.from.to_string(),
            destination_station: leg.to.to_string(),
            departure_time: format_local(leg.departure, tz),
            arrival_time: format_local(leg.arrival, tz),
            departure_timestamp: leg.departure.secs(),
            arrival_timestamp: leg.arrival.secs(),
        }
    }
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Render a timestamp as local "YYYY-MM-DD HH:MM".
fn format_local(t: Timestamp, tz: Tz) -> String {
    t.in_tz(tz)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| t.to_string())
}
