//! HTTP client for the remote analytics API.

pub mod client;
pub mod error;
pub mod types;

pub use client::AnalyticsApiClient;
pub use error::{AnalyticsApiError, Result};
pub use types::*;
