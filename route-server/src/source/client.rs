//! Transport API HTTP client.
//!
//! Provides async access to the station timetable endpoint. Handles
//! authentication, bounding of in-flight requests and status mapping.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use tokio::sync::Semaphore;
use tracing::debug;

use crate::domain::Crs;

use super::TimetableSource;
use super::error::SourceError;
use super::types::TimetableBoard;

/// Default base URL for the Transport API station endpoints.
const DEFAULT_BASE_URL: &str = "https://transportapi.com/v3/uk/train/station";

/// Default maximum concurrent requests.
const DEFAULT_MAX_CONCURRENT: usize = 5;

/// Configuration for the timetable client.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Application id query parameter
    pub app_id: String,
    /// Application key query parameter
    pub app_key: String,
    /// Base URL for the API (defaults to production Transport API)
    pub base_url: String,
    /// Maximum concurrent requests
    pub max_concurrent: usize,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl SourceConfig {
    /// Create a new config with the given credentials.
    pub fn new(app_id: impl Into<String>, app_key: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            app_key: app_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            timeout_secs: 30,
        }
    }

    /// Set a custom base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set maximum concurrent requests.
    pub fn with_max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = n;
        self
    }

    /// Set request timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// Transport API timetable client.
///
/// Uses a semaphore to limit concurrent requests, as the API is rate limited
/// per application key.
#[derive(Debug, Clone)]
pub struct TransportApiClient {
    http: reqwest::Client,
    base_url: String,
    app_id: String,
    app_key: String,
    semaphore: Arc<Semaphore>,
}

impl TransportApiClient {
    /// Create a new client with the given configuration.
    pub fn new(config: SourceConfig) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            app_id: config.app_id,
            app_key: config.app_key,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
        })
    }

    /// URL of the timetable endpoint for a station.
    fn timetable_url(&self, crs: &Crs) -> String {
        format!("{}/{}/timetable.json", self.base_url, crs.as_str())
    }

    /// Get the timetable board for a station from the given local date and time.
    pub async fn get_timetable(
        &self,
        crs: &Crs,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<TimetableBoard, SourceError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| SourceError::Api {
                status: 0,
                message: "Semaphore closed".to_string(),
            })?;

        let date = date.format("%Y-%m-%d").to_string();
        let time = time.format("%H:%M").to_string();
        debug!(station = %crs, %date, %time, "Requesting timetable");

        let response = self
            .http
            .get(self.timetable_url(crs))
            .query(&[
                ("app_id", self.app_id.as_str()),
                ("app_key", self.app_key.as_str()),
                ("date", date.as_str()),
                ("time", time.as_str()),
                ("train_status", "passenger"),
            ])
            .send()
            .await?;

        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(SourceError::Unauthorized);
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SourceError::RateLimited);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body = response.text().await?;

        serde_json::from_str(&body).map_err(|e| SourceError::Json {
            message: e.to_string(),
            body: Some(body.chars().take(500).collect()),
        })
    }
}

impl TimetableSource for TransportApiClient {
    async fn fetch_board(
        &self,
        station: &Crs,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<TimetableBoard, SourceError> {
        self.get_timetable(station, date, time).await
    }
}
