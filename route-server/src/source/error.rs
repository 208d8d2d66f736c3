//! Timetable source error types.

use super::convert::ConversionError;

/// Errors from fetching or decoding a station timetable.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed (network error, timeout, etc.)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON deserialization failed
    #[error("JSON parse error: {message}")]
    Json {
        message: String,
        body: Option<String>,
    },

    /// API returned an error status code
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Rate limited by the API
    #[error("rate limited by timetable API")]
    RateLimited,

    /// Invalid or missing app id / app key
    #[error("unauthorized: check TPT_APP_ID and TPT_APP_KEY")]
    Unauthorized,

    /// Board could not be converted to timetable rows
    #[error("invalid board: {0}")]
    Conversion(#[from] ConversionError),

    /// Mock data could not be loaded
    #[error("mock data error: {0}")]
    Mock(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = SourceError::Api {
            status: 500,
            message: "Internal Server Error".into(),
        };
        assert_eq!(err.to_string(), "API error 500: Internal Server Error");

        let err = SourceError::Json {
            message: "expected string".into(),
            body: Some("{}".into()),
        };
        assert!(err.to_string().contains("expected string"));

        let err = SourceError::from(ConversionError::InvalidDate("2024-13-01".into()));
        assert_eq!(err.to_string(), "invalid board: invalid date: 2024-13-01");
    }
}
