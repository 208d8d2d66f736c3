//! Timetable cache: interval-aware reads and on-demand refresh.
//!
//! Wraps a [`TimetableStore`] and knows how to fill a gap in a station's
//! coverage by downloading consecutive windows through a [`WindowFetcher`].

use chrono::Duration;

use crate::domain::{Crs, Interval, NewEntry, TimeField, Timestamp};
use crate::fetcher::{FetchError, FetchedWindow, WindowFetcher};
use crate::source::TimetableSource;
use crate::store::{Lookup, StoreError, TimetableStore};
use tracing::{debug, info};

/// Errors from refreshing the cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Every window downloaded for the gap came back without usable rows
    #[error("no timetable data for {station} from {start}")]
    EmptyWindow { station: Crs, start: Timestamp },
}

/// Cached timetable rows over a store.
pub struct TimetableCache<S> {
    store: S,
}

impl<S: TimetableStore + Sync> TimetableCache<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Entries whose `field` lies in `[t0, t1]`, if that range is cached.
    pub async fn read(
        &self,
        station: Crs,
        t0: Timestamp,
        t1: Timestamp,
        field: TimeField,
    ) -> Result<Lookup, StoreError> {
        self.store.read(station, t0, t1, field).await
    }

    /// Absorb `rows` as the full contents of window `[t0, t_max]`.
    pub async fn merge_in(
        &self,
        station: Crs,
        t0: Timestamp,
        t_max: Timestamp,
        rows: Vec<NewEntry>,
    ) -> Result<Interval, StoreError> {
        self.store.merge(station, t0, t_max, rows).await
    }

    /// Absorb a downloaded window.
    pub async fn absorb(&self, window: &FetchedWindow) -> Result<Interval, StoreError> {
        self.merge_in(window.station, window.start, window.stop, window.rows.clone())
            .await
    }

    pub async fn intervals(&self, station: Crs) -> Result<Vec<Interval>, StoreError> {
        self.store.intervals(station).await
    }

    /// Download and merge whatever is missing for `[t0, t1]` at a station.
    ///
    /// Starts at the first uncovered instant at or after `t0` and fetches
    /// consecutive windows, skipping spans that are already cached, until
    /// `t1` is covered.
    ///
    /// Windows that come back empty are only merged when the already cached
    /// part of `[t0, t1]` holds rows. A range with no rows anywhere fails with
    /// [`CacheError::EmptyWindow`] and nothing is stored.
    pub async fn refresh<P: TimetableSource + Sync>(
        &self,
        station: Crs,
        t0: Timestamp,
        t1: Timestamp,
        fetcher: &WindowFetcher<P>,
    ) -> Result<(), CacheError> {
        let mut windows = Vec::new();
        let mut cached = Vec::new();
        let mut cursor = t0;

        loop {
            if let Some(covering) = self.store.find_containing(station, cursor).await? {
                if cursor <= t1 {
                    cached.push((cursor, covering.stop));
                }
                cursor = covering.stop;
            }
            if cursor > t1 {
                break;
            }

            let window = fetcher.fetch_window(station, cursor).await?;
            if window.stop <= cursor {
                return Err(StoreError::InvalidWindow(format!(
                    "window for {station} from {cursor} has no extent"
                ))
                .into());
            }
            cursor = window.stop;
            windows.push(window);
        }

        let Some(first) = windows.first() else {
            debug!(station = %station, %t0, %t1, "Range already cached");
            return Ok(());
        };

        let all_empty = windows.iter().all(|w| w.rows.is_empty());
        if all_empty && !self.has_rows(station, &cached, t1).await? {
            return Err(CacheError::EmptyWindow {
                station,
                start: first.start,
            });
        }

        for window in &windows {
            let interval = self.absorb(window).await?;
            info!(
                station = %station,
                window_start = %window.start,
                window_stop = %window.stop,
                rows = window.rows.len(),
                interval_start = %interval.start,
                interval_stop = %interval.stop,
                "Cached timetable window"
            );
        }

        Ok(())
    }

    /// Whether any cached span, clipped to end at `t1`, holds a departure or
    /// an arrival.
    async fn has_rows(
        &self,
        station: Crs,
        spans: &[(Timestamp, Timestamp)],
        t1: Timestamp,
    ) -> Result<bool, StoreError> {
        for &(start, stop) in spans {
            let end = t1.min(stop + Duration::seconds(-1));
            for field in [TimeField::Departure, TimeField::Arrival] {
                if let Lookup::Complete(entries) = self.store.read(station, start, end, field).await? {
                    if !entries.is_empty() {
                        return Ok(true);
                    }
                }
            }
        }
        Ok(false)
    }
}
