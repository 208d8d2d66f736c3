//! Window fetcher: fixed-width fan-out of timetable downloads.
//!
//! A window starting at `t0` is downloaded as `concurrency` slices of
//! `window` width each, launched together and awaited together. Any failing
//! slice fails the whole window, so callers never consume a partial download.
//!
//! Completed windows are kept for a short TTL keyed by `(station, t0)`, which
//! also makes concurrent callers asking for the same window share a single
//! download instead of each issuing their own.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use chrono_tz::Tz;
use futures::future::join_all;
use moka::future::Cache as MokaCache;
use tracing::{debug, info};

use crate::domain::{Crs, NewEntry, Timestamp};
use crate::source::{SourceError, TimetableSource, convert_board};

/// Cache key for downloaded windows: (station, window start).
type WindowKey = (Crs, Timestamp);

/// Configuration for the window fetcher.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Width of one slice.
    pub window: Duration,

    /// Number of slices downloaded concurrently per window.
    pub concurrency: usize,

    /// Timezone the source's local times are interpreted in.
    pub timezone: Tz,

    /// How long a downloaded window is reused for identical requests.
    pub dedup_ttl: StdDuration,

    /// Maximum number of windows kept for reuse.
    pub max_capacity: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            window: Duration::seconds(7200),
            concurrency: 3,
            timezone: chrono_tz::Europe::London,
            dedup_ttl: StdDuration::from_secs(60),
            max_capacity: 1000,
        }
    }
}

impl FetchConfig {
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn with_dedup_ttl(mut self, ttl: StdDuration) -> Self {
        self.dedup_ttl = ttl;
        self
    }

    /// Total span covered by one window.
    pub fn span(&self) -> Duration {
        let slices = i32::try_from(self.concurrency).unwrap_or(i32::MAX);
        self.window * slices
    }
}

/// Rows downloaded for `[start, stop)` at one station.
///
/// Rows may carry timestamps beyond `stop`: each slice reports everything the
/// source returned for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedWindow {
    pub station: Crs,
    pub start: Timestamp,
    pub stop: Timestamp,
    pub rows: Vec<NewEntry>,
}

/// Errors from fetching a window.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    /// One slice of the window failed to download or parse
    #[error("download for {station} from {slice_start} failed: {source}")]
    Slice {
        station: Crs,
        slice_start: Timestamp,
        source: Arc<SourceError>,
    },

    /// A slice start has no representation as a local time
    #[error("timestamp {0} cannot be expressed as a local time")]
    Unrepresentable(Timestamp),
}

/// Downloads timetable windows from a [`TimetableSource`].
pub struct WindowFetcher<P> {
    source: P,
    config: FetchConfig,
    windows: MokaCache<WindowKey, Arc<FetchedWindow>>,
}

impl<P: TimetableSource + Sync> WindowFetcher<P> {
    pub fn new(source: P, config: FetchConfig) -> Self {
        let windows = MokaCache::builder()
            .time_to_live(config.dedup_ttl)
            .max_capacity(config.max_capacity)
            .build();

        Self {
            source,
            config,
            windows,
        }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    pub fn source(&self) -> &P {
        &self.source
    }

    /// Fetch the window `[t0, t0 + span)` for a station.
    pub async fn fetch_window(
        &self,
        station: Crs,
        t0: Timestamp,
    ) -> Result<Arc<FetchedWindow>, FetchError> {
        self.windows
            .try_get_with((station, t0), self.download(station, t0))
            .await
            .map_err(|e| (*e).clone())
    }

    async fn download(&self, station: Crs, t0: Timestamp) -> Result<Arc<FetchedWindow>, FetchError> {
        let slice_starts: Vec<Timestamp> = (0..self.config.concurrency)
            .map(|i| {
                let i = i32::try_from(i).unwrap_or(i32::MAX);
                t0 + self.config.window * i
            })
            .collect();

        info!(
            station = %station,
            window_start = %t0,
            slices = slice_starts.len(),
            "Downloading timetable window"
        );

        let results = join_all(
            slice_starts
                .iter()
                .map(|&start| self.download_slice(station, start)),
        )
        .await;

        let mut seen = HashSet::new();
        let mut rows = Vec::new();
        for result in results {
            for row in result? {
                if seen.insert(row.clone()) {
                    rows.push(row);
                }
            }
        }

        debug!(station = %station, window_start = %t0, rows = rows.len(), "Downloaded window");

        Ok(Arc::new(FetchedWindow {
            station,
            start: t0,
            stop: t0 + self.config.span(),
            rows,
        }))
    }

    async fn download_slice(
        &self,
        station: Crs,
        start: Timestamp,
    ) -> Result<Vec<NewEntry>, FetchError> {
        let local = start
            .in_tz(self.config.timezone)
            .ok_or(FetchError::Unrepresentable(start))?;
        let slice_error = |e: SourceError| FetchError::Slice {
            station,
            slice_start: start,
            source: Arc::new(e),
        };

        let board = self
            .source
            .fetch_board(&station, local.date_naive(), local.time())
            .await
            .map_err(slice_error)?;

        convert_board(&board, self.config.timezone)
            .map_err(|e| slice_error(SourceError::from(e)))
    }
}
