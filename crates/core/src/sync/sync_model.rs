//! Visit sync domain models.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-partition (per-website) sync status.
///
/// A partition that has only ever failed carries an error count but no
/// successful sync instant yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionStatus {
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_day_synced: Option<String>,
    pub sessions_processed: i64,
    pub error_count: i64,
}

/// Singleton sync watermark document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncWatermark {
    pub last_successful_sync_at: Option<DateTime<Utc>>,
    pub partition_status: HashMap<String, PartitionStatus>,
    pub last_run_status: Option<String>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_run_duration_ms: Option<i64>,
    pub last_error: Option<String>,
    pub consecutive_failures: i32,
}

/// Session row read from the relational source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: String,
    pub partition_id: String,
    pub created_at: DateTime<Utc>,
    pub identity: String,
}

/// Session detail returned by the remote analytics API.
///
/// The same shape is stored on the user record as its analytics snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsRecord {
    pub session_id: String,
    pub partition_id: String,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub device: Option<String>,
    pub screen: Option<String>,
    pub language: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub visit_count: i64,
    pub view_count: String,
    pub created_at: DateTime<Utc>,
}

/// User record owned by the document store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub identity: String,
    pub session_id: Option<String>,
    pub analytics: Option<AnalyticsRecord>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    Initial,
    Incremental,
}

/// The `[start, end)` range one run scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub kind: WindowKind,
}

impl SyncWindow {
    /// Calendar day of the window end, as stored in `lastDaySynced`.
    pub fn end_day(&self) -> String {
        self.end.format("%Y-%m-%d").to_string()
    }
}

/// Orchestrator states a run can fail in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Planning,
    SessionSync,
    AnalyticsSync,
    Finalizing,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::SessionSync => "session_sync",
            Self::AnalyticsSync => "analytics_sync",
            Self::Finalizing => "finalizing",
        }
    }
}

/// Match counters for one correlation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationStats {
    pub matched: usize,
    pub unmatched: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSyncStats {
    pub fetched: usize,
    pub dropped_unconfigured: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionSyncStatus {
    Synced,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionOutcome {
    pub partition_id: String,
    pub status: PartitionSyncStatus,
    pub fetched: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub failed: usize,
    pub error: Option<String>,
}

/// Summary of one completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub window: SyncWindow,
    pub sessions: SessionSyncStats,
    pub partitions: Vec<PartitionOutcome>,
    pub duration_ms: i64,
}

impl SyncRunReport {
    pub fn failed_partitions(&self) -> usize {
        self.partitions
            .iter()
            .filter(|p| p.status == PartitionSyncStatus::Failed)
            .count()
    }
}

/// Outcome written to the watermark document at the end of every run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutcome {
    pub status: String,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub error: Option<String>,
}

impl RunOutcome {
    pub const OK: &'static str = "ok";
    pub const FAILED: &'static str = "failed";

    pub fn is_ok(&self) -> bool {
        self.status == Self::OK
    }
}

/// Result of a run-lease acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseAcquisition {
    Acquired,
    Held {
        holder: String,
        expires_at: DateTime<Utc>,
    },
}
