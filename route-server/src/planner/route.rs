//! Greedy multi-leg route finding.
//!
//! Each consecutive pair of stations is one leg. A leg takes the best train
//! leaving the origin no earlier than the previous arrival; the next leg then
//! starts from where and when that train arrives. Legs are never revisited,
//! so the route is the greedy chain of per-leg best connections.

use chrono::Duration;
use tracing::{debug, info};

use crate::cache::{CacheError, TimetableCache};
use crate::domain::{Crs, TimeField, TimetableEntry, Timestamp};
use crate::fetcher::{FetchError, WindowFetcher};
use crate::source::TimetableSource;
use crate::store::{Lookup, StoreError, TimetableStore};

use super::config::RouteConfig;
use super::select::{Connection, best_connection, join_connections};

/// Error from route finding.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    /// Malformed station list or time input
    #[error("invalid route request: {0}")]
    InvalidRequest(String),

    /// The timetable source failed
    #[error("timetable source unavailable: {0}")]
    UpstreamUnavailable(#[source] FetchError),

    /// The source answered but the timetable is still missing
    #[error("no timetable data for {station}: {reason}")]
    DataUnavailable { station: Crs, reason: String },

    /// No train runs from one station to the next
    #[error("no train from {from} to {to} departing from {after}")]
    RouteNotFound { from: Crs, to: Crs, after: Timestamp },

    /// The only trains leave later than the passenger is willing to wait
    #[error(
        "next train from {from} to {to} leaves after {wait_mins} minutes, \
         longer than the {max_wait_mins} minute wait allowed"
    )]
    ExcessiveWait {
        from: Crs,
        to: Crs,
        wait_mins: i64,
        max_wait_mins: i64,
    },

    /// The timetable store failed
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<CacheError> for RouteError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Store(e) => RouteError::Store(e),
            CacheError::Fetch(e) => RouteError::UpstreamUnavailable(e),
            CacheError::EmptyWindow { station, start } => RouteError::DataUnavailable {
                station,
                reason: format!("the source returned no services from {start}"),
            },
        }
    }
}

/// A route query: travel through `stations` in order, leaving no earlier
/// than `start` and waiting at most `max_wait` at each station.
#[derive(Debug, Clone)]
pub struct RouteRequest {
    pub stations: Vec<Crs>,
    pub start: Timestamp,
    pub max_wait: Duration,
}

impl RouteRequest {
    pub fn new(stations: Vec<Crs>, start: Timestamp, max_wait: Duration) -> Self {
        Self {
            stations,
            start,
            max_wait,
        }
    }

    pub fn validate(&self) -> Result<(), RouteError> {
        if self.stations.len() < 2 {
            return Err(RouteError::InvalidRequest(
                "at least two stations are required".to_string(),
            ));
        }

        if let Some(pair) = self.stations.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(RouteError::InvalidRequest(format!(
                "station {} is repeated back to back",
                pair[0]
            )));
        }

        if self.max_wait < Duration::zero() {
            return Err(RouteError::InvalidRequest(
                "maximum wait cannot be negative".to_string(),
            ));
        }

        Ok(())
    }
}

/// One train ride between consecutive stations of a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegResult {
    pub train_uid: String,
    pub from: Crs,
    pub to: Crs,
    pub departure: Timestamp,
    pub arrival: Timestamp,
}

/// The chained legs of a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Itinerary {
    legs: Vec<LegResult>,
    departure: Timestamp,
    arrival: Timestamp,
}

impl Itinerary {
    /// Build an itinerary; `None` when there are no legs.
    pub fn new(legs: Vec<LegResult>) -> Option<Self> {
        let departure = legs.first()?.departure;
        let arrival = legs.last()?.arrival;
        Some(Self {
            legs,
            departure,
            arrival,
        })
    }

    pub fn legs(&self) -> &[LegResult] {
        &self.legs
    }

    /// Departure of the first leg.
    pub fn departure(&self) -> Timestamp {
        self.departure
    }

    /// Arrival of the last leg.
    pub fn arrival(&self) -> Timestamp {
        self.arrival
    }

    /// Time from first departure to final arrival.
    pub fn total_duration(&self) -> Duration {
        self.arrival - self.departure
    }
}

/// Route finder over a timetable cache, downloading on cache misses.
pub struct RouteFinder<'a, S, P> {
    cache: &'a TimetableCache<S>,
    fetcher: &'a WindowFetcher<P>,
    config: &'a RouteConfig,
}

impl<'a, S, P> RouteFinder<'a, S, P>
where
    S: TimetableStore + Sync,
    P: TimetableSource + Sync,
{
    pub fn new(
        cache: &'a TimetableCache<S>,
        fetcher: &'a WindowFetcher<P>,
        config: &'a RouteConfig,
    ) -> Self {
        Self {
            cache,
            fetcher,
            config,
        }
    }

    /// Chain the best leg between each consecutive pair of stations.
    ///
    /// Any failing leg fails the whole route.
    pub async fn find_route(&self, request: &RouteRequest) -> Result<Itinerary, RouteError> {
        request.validate()?;

        let mut legs = Vec::with_capacity(request.stations.len() - 1);
        let mut t_dept = request.start;

        for pair in request.stations.windows(2) {
            let leg = self
                .find_leg(pair[0], pair[1], t_dept, request.max_wait)
                .await?;
            info!(
                from = %leg.from,
                to = %leg.to,
                train_uid = %leg.train_uid,
                departure = %leg.departure,
                arrival = %leg.arrival,
                "Found leg"
            );
            t_dept = leg.arrival;
            legs.push(leg);
        }

        Itinerary::new(legs).ok_or_else(|| {
            RouteError::InvalidRequest("at least two stations are required".to_string())
        })
    }

    /// Best train from `from` to `to` leaving at or after `t_dept`.
    ///
    /// Departures are scanned up to the configured upper bound wait, so a
    /// train the passenger would have to wait too long for is reported as
    /// [`RouteError::ExcessiveWait`] rather than not found.
    pub async fn find_leg(
        &self,
        from: Crs,
        to: Crs,
        t_dept: Timestamp,
        max_wait: Duration,
    ) -> Result<LegResult, RouteError> {
        let upper_bound = self.config.upper_bound_wait();
        let tolerance = max_wait.min(upper_bound);
        let t_dept_max = t_dept + upper_bound;
        let t_arri_max = t_dept_max + self.config.max_single_journey();

        let departures = self
            .read_with_retry(from, t_dept, t_dept_max, TimeField::Departure)
            .await?;
        let arrivals = self
            .read_with_retry(to, t_dept, t_arri_max, TimeField::Arrival)
            .await?;

        let connections = join_connections(&departures, &arrivals);
        debug!(
            from = %from,
            to = %to,
            departures = departures.len(),
            arrivals = arrivals.len(),
            connections = connections.len(),
            "Joined leg candidates"
        );

        let within: Vec<&Connection> = connections
            .iter()
            .filter(|c| c.departure - t_dept <= tolerance)
            .collect();

        if let Some(best) = best_connection(within) {
            return Ok(LegResult {
                train_uid: best.train_uid.clone(),
                from,
                to,
                departure: best.departure,
                arrival: best.arrival,
            });
        }

        match best_connection(&connections) {
            Some(late) => Err(RouteError::ExcessiveWait {
                from,
                to,
                wait_mins: (late.departure - t_dept).num_minutes(),
                max_wait_mins: tolerance.num_minutes(),
            }),
            None => Err(RouteError::RouteNotFound {
                from,
                to,
                after: t_dept,
            }),
        }
    }

    /// Read from the cache, downloading and retrying once on a miss.
    async fn read_with_retry(
        &self,
        station: Crs,
        t0: Timestamp,
        t1: Timestamp,
        field: TimeField,
    ) -> Result<Vec<TimetableEntry>, RouteError> {
        if let Lookup::Complete(entries) = self.cache.read(station, t0, t1, field).await? {
            return Ok(entries);
        }

        debug!(station = %station, %t0, %t1, ?field, "Cache miss");
        self.cache.refresh(station, t0, t1, self.fetcher).await?;

        match self.cache.read(station, t0, t1, field).await? {
            Lookup::Complete(entries) => Ok(entries),
            Lookup::Incomplete => Err(RouteError::DataUnavailable {
                station,
                reason: format!("coverage from {t0} to {t1} still incomplete after download"),
            }),
        }
    }
}
