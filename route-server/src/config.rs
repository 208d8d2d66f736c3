//! Process configuration from environment variables.

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration as StdDuration;

use chrono::Duration;
use chrono_tz::Tz;
use tracing::warn;

use crate::fetcher::FetchConfig;
use crate::planner::RouteConfig;
use crate::source::SourceConfig;

/// Errors from reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set (or set TPT_MOCK_DIR to use sample data)")]
    Missing(&'static str),

    #[error("invalid {key}={value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Where timetable boards come from.
#[derive(Debug, Clone)]
pub enum SourceSettings {
    Live(SourceConfig),
    Mock(PathBuf),
}

/// Everything needed to start the server.
#[derive(Debug, Clone)]
pub struct Settings {
    pub source: SourceSettings,
    pub database_url: String,
    pub fetch: FetchConfig,
    pub route: RouteConfig,
    pub port: u16,
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`, which returns the value of a variable
    /// if it is set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let source = match var("TPT_MOCK_DIR") {
            Some(dir) => SourceSettings::Mock(PathBuf::from(dir)),
            None => {
                let app_id = var("TPT_APP_ID").ok_or(ConfigError::Missing("TPT_APP_ID"))?;
                let app_key = var("TPT_APP_KEY").ok_or(ConfigError::Missing("TPT_APP_KEY"))?;
                let mut config = SourceConfig::new(app_id, app_key);
                if let Some(url) = var("TPT_URL") {
                    config = config.with_base_url(url);
                }
                SourceSettings::Live(config)
            }
        };

        let timezone = match var("TIMETABLE_TZ") {
            Some(_) => parse_or(&var, "TIMETABLE_TZ", chrono_tz::Europe::London)?,
            None => var("TZ")
                .and_then(|tz| process_timezone(&tz))
                .unwrap_or(chrono_tz::Europe::London),
        };
        let window_secs: i64 = parse_or(&var, "T_WINDOW", 7200)?;
        let concurrency: usize = parse_or(&var, "DOWNLOAD_CONCURRENCY", 3)?;
        let ttl_secs: u64 = parse_or(&var, "FETCH_CACHE_TTL_SECS", 60)?;
        let ub_wait_mins: i64 = parse_or(&var, "UB_MAX_WAITING", 180)?;
        let max_single_secs: i64 = parse_or(&var, "MAX_SINGLE_JOURNEY", 14_400)?;
        let port: u16 = parse_or(&var, "SERVER_PORT", 9000)?;

        require(window_secs > 0, "T_WINDOW", window_secs, "must be positive")?;
        require(concurrency > 0, "DOWNLOAD_CONCURRENCY", concurrency, "must be at least 1")?;
        require(ub_wait_mins >= 0, "UB_MAX_WAITING", ub_wait_mins, "cannot be negative")?;
        require(max_single_secs > 0, "MAX_SINGLE_JOURNEY", max_single_secs, "must be positive")?;

        Ok(Self {
            source,
            database_url: var("DB_URL").unwrap_or_else(|| "sqlite://train.db".to_string()),
            fetch: FetchConfig::default()
                .with_window(Duration::seconds(window_secs))
                .with_concurrency(concurrency)
                .with_timezone(timezone)
                .with_dedup_ttl(StdDuration::from_secs(ttl_secs)),
            route: RouteConfig::new(ub_wait_mins, max_single_secs),
            port,
        })
    }
}

/// The process `TZ`, if it names an IANA zone such as `Europe/London`.
///
/// Container values like `:/etc/localtime` or POSIX rules such as
/// `GMT0BST,M3.5.0/1,M10.5.0` are not zones and fall back to the default.
/// Set `TIMETABLE_TZ` to choose a zone explicitly.
fn process_timezone(value: &str) -> Option<Tz> {
    let name = value.trim().trim_start_matches(':');
    match name.parse::<Tz>() {
        Ok(tz) => Some(tz),
        Err(_) => {
            warn!(tz = %value, "Ignoring TZ that is not an IANA zone name");
            None
        }
    }
}

fn parse_or<T>(
    var: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match var(key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}

fn require(ok: bool, key: &'static str, value: impl Display, reason: &str) -> Result<(), ConfigError> {
    if ok {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: reason.to_string(),
        })
    }
}
