//! Contracts the sync engine holds against its external collaborators.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::warn;

use super::sync_model::{
    AnalyticsRecord, LeaseAcquisition, PartitionStatus, RunOutcome, SessionRecord, SyncWatermark,
    UserRecord,
};
use crate::errors::Result;

/// Persisted watermark singleton, per-partition statuses and the run lease.
#[async_trait]
pub trait WatermarkStoreTrait: Send + Sync {
    /// Returns the watermark document, or an empty one if it was never written.
    fn read(&self) -> Result<SyncWatermark>;

    /// Replaces the status of one partition (creates it on first write).
    async fn upsert_partition_status(
        &self,
        partition_id: String,
        status: PartitionStatus,
    ) -> Result<()>;

    /// Adds one to the partition's error count, creating the entry if needed.
    async fn increment_partition_errors(&self, partition_id: String) -> Result<()>;

    async fn advance_global_watermark(&self, instant: DateTime<Utc>) -> Result<()>;

    /// Stores the last run's status. Never touches `last_successful_sync_at`.
    async fn record_run_outcome(&self, outcome: RunOutcome) -> Result<()>;

    async fn try_acquire_run_lease(
        &self,
        holder: String,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<LeaseAcquisition>;

    /// Drops the lease if `holder` still owns it.
    async fn release_run_lease(&self, holder: String) -> Result<()>;
}

/// User records, addressed by identity for session sync and by session id
/// for analytics sync. Both updates return the number of records changed.
#[async_trait]
pub trait UserRecordStoreTrait: Send + Sync {
    async fn set_session_id_by_identity(&self, identity: String, session_id: String)
        -> Result<usize>;

    async fn set_analytics_by_session_id(
        &self,
        session_id: String,
        analytics: AnalyticsRecord,
    ) -> Result<usize>;

    fn find_by_identity(&self, identity: &str) -> Result<Option<UserRecord>>;
}

/// Relational source of newly created sessions.
#[async_trait]
pub trait SessionSourceTrait: Send + Sync {
    /// Sessions created at or after `start`, oldest first.
    async fn fetch_sessions_since(&self, start: DateTime<Utc>) -> Result<Vec<SessionRecord>>;

    async fn check_connection(&self) -> Result<()>;
}

/// One page request against the analytics API. Pages are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPageRequest {
    pub partition_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub page: u32,
    pub page_size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page_size: u32,
    pub max_pages: u32,
}

/// Remote analytics API. The token returned by `authenticate` is cached by
/// the implementation and used by every page fetch until `clear_token`.
#[async_trait]
pub trait AnalyticsApiTrait: Send + Sync {
    async fn authenticate(&self) -> Result<String>;

    async fn fetch_page(&self, request: &SessionPageRequest) -> Result<Vec<AnalyticsRecord>>;

    async fn clear_token(&self);

    /// Checks that the cached token is accepted by the API.
    async fn verify(&self) -> Result<()>;

    /// Pages through every session of a partition in `[start, end)`.
    ///
    /// A page shorter than `page_size` ends the scan. If `max_pages` full pages
    /// come back, the scan stops with a warning and returns what it has.
    /// Page errors are returned as-is, without retry.
    async fn fetch_all_sessions(
        &self,
        partition_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        pagination: Pagination,
    ) -> Result<Vec<AnalyticsRecord>> {
        let mut records = Vec::new();
        for page in 1..=pagination.max_pages {
            let batch = self
                .fetch_page(&SessionPageRequest {
                    partition_id: partition_id.to_string(),
                    start,
                    end,
                    page,
                    page_size: pagination.page_size,
                })
                .await?;
            let batch_len = batch.len();
            records.extend(batch);
            if batch_len < pagination.page_size as usize {
                return Ok(records);
            }
        }

        warn!(
            "[VisitSync] Pagination ceiling of {} pages reached for website {}; stopping with {} sessions",
            pagination.max_pages,
            partition_id,
            records.len()
        );
        Ok(records)
    }
}
