//! Arrival-time route planner server.
//!
//! Answers "travelling through these stations in order from this time, when
//! do I arrive?" by chaining single-leg train connections. Station timetables
//! are downloaded on demand in fixed windows and cached per station as
//! coalesced intervals of known coverage.

pub mod cache;
pub mod config;
pub mod domain;
pub mod fetcher;
pub mod planner;
pub mod source;
pub mod store;
pub mod web;
