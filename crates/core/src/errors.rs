//! Error types for the visit sync engine.

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the engine and its adapters.
#[derive(Debug, Error)]
pub enum Error {
    /// Document store failure (user records, watermark, lease)
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Relational session source could not be reached or queried
    #[error("Session source unavailable: {0}")]
    SourceUnavailable(String),

    /// Remote analytics API returned an error or an unreadable response
    #[error("Analytics API error: {0}")]
    AnalyticsApi(String),

    /// Analytics API authentication failed or no token is cached
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Missing or invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// A non-empty session batch produced zero user updates
    #[error("No user records matched any of {rows} session rows")]
    NoSessionMatches { rows: usize },

    /// Another run holds an unexpired lease
    #[error("Sync run already in progress (lease held by {holder} until {expires_at})")]
    RunInProgress { holder: String, expires_at: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Failed to connect: {0}")]
    ConnectionFailed(String),

    #[error("Failed to create connection pool: {0}")]
    PoolCreationFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Internal database error: {0}")]
    Internal(String),
}

impl Error {
    pub fn source_unavailable(message: impl Into<String>) -> Self {
        Self::SourceUnavailable(message.into())
    }

    pub fn analytics_api(message: impl Into<String>) -> Self {
        Self::AnalyticsApi(message.into())
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Short machine-readable code, stored as the run's last error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Database(_) => "database",
            Self::SourceUnavailable(_) => "source_unavailable",
            Self::AnalyticsApi(_) => "analytics_api",
            Self::Auth(_) => "auth",
            Self::Config(_) => "config",
            Self::NoSessionMatches { .. } => "no_session_matches",
            Self::RunInProgress { .. } => "run_in_progress",
            Self::Json(_) => "json",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_session_matches_message_includes_row_count() {
        let err = Error::NoSessionMatches { rows: 4 };
        assert_eq!(
            err.to_string(),
            "No user records matched any of 4 session rows"
        );
        assert_eq!(err.code(), "no_session_matches");
    }

    #[test]
    fn database_error_converts_into_engine_error() {
        let err: Error = DatabaseError::QueryFailed("disk I/O error".to_string()).into();
        assert!(matches!(err, Error::Database(DatabaseError::QueryFailed(_))));
        assert_eq!(err.code(), "database");
    }
}
