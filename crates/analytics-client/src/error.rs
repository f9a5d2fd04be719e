//! Error types for the analytics API client.

use thiserror::Error;

/// Result type alias for analytics API operations.
pub type Result<T> = std::result::Result<T, AnalyticsApiError>;

/// Errors that can occur while talking to the analytics API.
#[derive(Debug, Error)]
pub enum AnalyticsApiError {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error response from the analytics API
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Invalid request (bad base URL, malformed header value, etc.)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Authentication error (missing token or rejected credentials)
    #[error("Authentication error: {0}")]
    Auth(String),
}

impl AnalyticsApiError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    /// HTTP status if this is an API error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for missing tokens and 401/403 responses.
    pub fn is_auth_failure(&self) -> bool {
        match self {
            Self::Auth(_) => true,
            Self::Api { status, .. } => matches!(*status, 401 | 403),
            _ => false,
        }
    }
}

impl From<AnalyticsApiError> for visitsync_core::Error {
    fn from(err: AnalyticsApiError) -> Self {
        if err.is_auth_failure() {
            return visitsync_core::Error::Auth(err.to_string());
        }
        visitsync_core::Error::AnalyticsApi(err.to_string())
    }
}
