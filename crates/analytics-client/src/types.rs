//! Request and response types for the analytics API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use visitsync_core::sync::AnalyticsRecord;

// ─────────────────────────────────────────────────────────────────────────────
// Auth
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

/// Error body returned by the API on non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(alias = "error")]
    pub message: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Website sessions
// ─────────────────────────────────────────────────────────────────────────────

/// One page of `GET /api/websites/{id}/sessions`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPage {
    #[serde(default)]
    pub data: Vec<ApiSession>,
    #[serde(default)]
    pub count: Option<i64>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSession {
    pub id: String,
    #[serde(default)]
    pub website_id: Option<String>,
    #[serde(default)]
    pub browser: Option<String>,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub screen: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub subdivision1: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    pub first_at: DateTime<Utc>,
    pub last_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "count_from_number_or_string")]
    pub visits: i64,
    #[serde(default = "zero_views", deserialize_with = "string_from_number_or_string")]
    pub views: String,
    pub created_at: DateTime<Utc>,
}

impl ApiSession {
    /// Maps the wire item onto the engine's analytics record. Items without a
    /// `websiteId` belong to the partition that was requested.
    pub fn into_record(self, requested_partition: &str) -> AnalyticsRecord {
        AnalyticsRecord {
            session_id: self.id,
            partition_id: self
                .website_id
                .unwrap_or_else(|| requested_partition.to_string()),
            browser: self.browser,
            os: self.os,
            device: self.device,
            screen: self.screen,
            language: self.language,
            country: self.country,
            region: self.subdivision1,
            city: self.city,
            first_seen_at: self.first_at,
            last_seen_at: self.last_at,
            visit_count: self.visits,
            view_count: self.views,
            created_at: self.created_at,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Int(i64),
    Float(f64),
    Text(String),
}

fn zero_views() -> String {
    "0".to_string()
}

fn count_from_number_or_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(0),
        Some(NumberOrString::Int(n)) => Ok(n),
        Some(NumberOrString::Float(f))
            if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 =>
        {
            Ok(f as i64)
        }
        Some(NumberOrString::Float(f)) => Err(serde::de::Error::custom(format!(
            "invalid count '{}': not a whole number",
            f
        ))),
        Some(NumberOrString::Text(s)) if s.trim().is_empty() => Ok(0),
        Some(NumberOrString::Text(s)) => s
            .trim()
            .parse::<i64>()
            .map_err(|e| serde::de::Error::custom(format!("invalid count '{}': {}", s, e))),
    }
}

fn string_from_number_or_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<NumberOrString>::deserialize(deserializer)? {
        None => zero_views(),
        Some(NumberOrString::Int(n)) => n.to_string(),
        Some(NumberOrString::Float(f)) => f.to_string(),
        Some(NumberOrString::Text(s)) => s,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ITEM: &str = r#"{
        "id": "s-1",
        "websiteId": "site-a",
        "browser": "firefox",
        "os": "Linux",
        "device": "desktop",
        "screen": "1920x1080",
        "language": "de-DE",
        "country": "DE",
        "subdivision1": "DE-BE",
        "city": "Berlin",
        "firstAt": "2026-06-01T10:00:00.000Z",
        "lastAt": "2026-06-01T10:45:00.000Z",
        "visits": "2",
        "views": 17,
        "createdAt": "2026-06-01T10:00:00.000Z"
    }"#;

    #[test]
    fn session_item_maps_to_analytics_record() {
        let session: ApiSession = serde_json::from_str(ITEM).expect("parse");
        let record = session.into_record("ignored");
        assert_eq!(record.session_id, "s-1");
        assert_eq!(record.partition_id, "site-a");
        assert_eq!(record.region.as_deref(), Some("DE-BE"));
        assert_eq!(record.visit_count, 2);
        assert_eq!(record.view_count, "17");
        assert_eq!(
            record.last_seen_at.to_rfc3339(),
            "2026-06-01T10:45:00+00:00"
        );
    }

    #[test]
    fn sparse_item_falls_back_to_requested_partition() {
        let session: ApiSession = serde_json::from_str(
            r#"{"id":"s-2","firstAt":"2026-06-01T10:00:00Z","lastAt":"2026-06-01T10:00:00Z","views":"4","visits":null,"createdAt":"2026-06-01T10:00:00Z"}"#,
        )
        .expect("parse");
        let record = session.into_record("site-b");
        assert_eq!(record.partition_id, "site-b");
        assert_eq!(record.visit_count, 0);
        assert_eq!(record.view_count, "4");
        assert!(record.browser.is_none());
    }

    #[test]
    fn non_numeric_visit_count_is_rejected() {
        let err = serde_json::from_str::<ApiSession>(
            r#"{"id":"s-3","firstAt":"2026-06-01T10:00:00Z","lastAt":"2026-06-01T10:00:00Z","visits":"many","createdAt":"2026-06-01T10:00:00Z"}"#,
        )
        .expect_err("invalid visits");
        assert!(err.to_string().contains("invalid count"));
    }

    #[test]
    fn fractional_visit_count_is_rejected() {
        let err = serde_json::from_str::<ApiSession>(
            r#"{"id":"s-4","firstAt":"2026-06-01T10:00:00Z","lastAt":"2026-06-01T10:00:00Z","visits":2.5,"createdAt":"2026-06-01T10:00:00Z"}"#,
        )
        .expect_err("fractional visits");
        assert!(err.to_string().contains("invalid count"));

        let err = serde_json::from_str::<ApiSession>(
            r#"{"id":"s-5","firstAt":"2026-06-01T10:00:00Z","lastAt":"2026-06-01T10:00:00Z","visits":1e300,"createdAt":"2026-06-01T10:00:00Z"}"#,
        )
        .expect_err("out of range visits");
        assert!(err.to_string().contains("invalid count"));
    }

    #[test]
    fn whole_float_visit_count_is_accepted() {
        let session: ApiSession = serde_json::from_str(
            r#"{"id":"s-6","firstAt":"2026-06-01T10:00:00Z","lastAt":"2026-06-01T10:00:00Z","visits":3.0,"createdAt":"2026-06-01T10:00:00Z"}"#,
        )
        .expect("parse");
        assert_eq!(session.visits, 3);
    }

    #[test]
    fn page_tolerates_missing_metadata() {
        let page: SessionPage = serde_json::from_str(r#"{"data":[]}"#).expect("parse");
        assert!(page.data.is_empty());
        assert!(page.count.is_none());
    }
}
