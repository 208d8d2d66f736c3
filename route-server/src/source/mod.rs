//! Timetable source client.
//!
//! The external source is the Transport API station timetable endpoint,
//! which returns the services calling at one station from a given local date
//! and time-of-day. Key characteristics:
//! - Responses cover a limited window, so longer spans need several requests
//! - Times are "HH:MM" strings relative to the request date and time
//! - Requests are rate limited per application key

mod client;
mod convert;
mod error;
mod mock;
mod types;

use std::future::Future;

use chrono::{NaiveDate, NaiveTime};

use crate::domain::Crs;

pub use client::{SourceConfig, TransportApiClient};
pub use convert::{ConversionError, convert_board};
pub use error::SourceError;
pub use mock::{MockRequest, MockTimetableSource};
pub use types::{DepartureItem, Departures, TimetableBoard};

/// Something that can serve a station's timetable board.
///
/// This abstraction allows the window fetcher to be tested without network
/// access.
pub trait TimetableSource {
    /// Get the board for `station` listing services from local `date` and
    /// `time` onwards.
    fn fetch_board(
        &self,
        station: &Crs,
        date: NaiveDate,
        time: NaiveTime,
    ) -> impl Future<Output = Result<TimetableBoard, SourceError>> + Send;
}

/// The source selected at startup: the live API or sample files.
pub enum ConfiguredSource {
    Live(TransportApiClient),
    Mock(MockTimetableSource),
}

impl TimetableSource for ConfiguredSource {
    async fn fetch_board(
        &self,
        station: &Crs,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<TimetableBoard, SourceError> {
        match self {
            ConfiguredSource::Live(client) => client.fetch_board(station, date, time).await,
            ConfiguredSource::Mock(mock) => mock.fetch_board(station, date, time).await,
        }
    }
}
