//! Application state for the web layer.

use std::sync::Arc;

use chrono_tz::Tz;

use crate::cache::TimetableCache;
use crate::fetcher::WindowFetcher;
use crate::planner::RouteConfig;
use crate::source::ConfiguredSource;
use crate::store::SqliteStore;

/// Shared application state.
///
/// Contains all the services needed to handle requests.
#[derive(Clone)]
pub struct AppState {
    /// Timetable cache over the SQLite store
    pub cache: Arc<TimetableCache<SqliteStore>>,

    /// Downloads windows on cache misses
    pub fetcher: Arc<WindowFetcher<ConfiguredSource>>,

    /// Route finder limits
    pub route: Arc<RouteConfig>,

    /// Timezone for request parsing and response formatting
    pub timezone: Tz,
}

impl AppState {
    /// Create a new app state.
    pub fn new(
        cache: TimetableCache<SqliteStore>,
        fetcher: WindowFetcher<ConfiguredSource>,
        route: RouteConfig,
    ) -> Self {
        let timezone = fetcher.config().timezone;
        Self {
            cache: Arc::new(cache),
            fetcher: Arc::new(fetcher),
            route: Arc::new(route),
            timezone,
        }
    }
}
