//! Route finder configuration.

use chrono::Duration;

/// Limits applied to every leg of a route.
#[derive(Debug, Clone)]
pub struct RouteConfig {
    /// Upper bound on the wait at any station (minutes).
    /// A passenger's own tolerance is capped to this.
    pub upper_bound_wait_mins: i64,

    /// Longest single train ride considered (seconds).
    pub max_single_journey_secs: i64,
}

impl RouteConfig {
    pub fn new(upper_bound_wait_mins: i64, max_single_journey_secs: i64) -> Self {
        Self {
            upper_bound_wait_mins,
            max_single_journey_secs,
        }
    }

    /// Returns the upper bound wait as a Duration.
    pub fn upper_bound_wait(&self) -> Duration {
        Duration::minutes(self.upper_bound_wait_mins)
    }

    /// Returns the maximum single journey as a Duration.
    pub fn max_single_journey(&self) -> Duration {
        Duration::seconds(self.max_single_journey_secs)
    }
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            upper_bound_wait_mins: 180,
            max_single_journey_secs: 14_400, // 4 hours
        }
    }
}
