//! Multi-leg route finder.
//!
//! This module answers "travelling through these stations in order, leaving
//! at this time, when do I arrive?". Each leg reads departures and arrivals
//! from the timetable cache, downloading on a miss, and joins them on the
//! train identifier to pick the earliest-arriving connection.

mod config;
mod route;
mod select;


pub use config::RouteConfig;
pub use route::{Itinerary, LegResult, RouteError, RouteFinder, RouteRequest};
pub use select::{Connection, best_connection, join_connections};
