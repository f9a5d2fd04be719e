//! Repository for the watermark document, partition statuses and run lease.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::sqlite::SqliteConnection;
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

use visitsync_core::errors::Result;
use visitsync_core::sync::{
    LeaseAcquisition, PartitionStatus, RunOutcome, SyncWatermark, WatermarkStoreTrait,
};

use crate::db::{
    format_timestamp, get_connection, parse_optional_timestamp, parse_timestamp, WriteHandle,
};
use crate::errors::StorageError;
use crate::schema::{sync_partition_status, sync_run_lease, sync_watermark};

use super::model::{SyncPartitionStatusDB, SyncRunLeaseDB, SyncWatermarkDB};

pub struct WatermarkRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl WatermarkRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        Self { pool, writer }
    }

    fn read_impl(&self) -> Result<SyncWatermark> {
        let mut conn = get_connection(&self.pool)?;
        let row = sync_watermark::table
            .find(1)
            .first::<SyncWatermarkDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        let partitions = sync_partition_status::table
            .order(sync_partition_status::partition_id.asc())
            .load::<SyncPartitionStatusDB>(&mut conn)
            .map_err(StorageError::from)?;

        let mut partition_status = HashMap::with_capacity(partitions.len());
        for partition in partitions {
            let (partition_id, status) = partition.into_domain()?;
            partition_status.insert(partition_id, status);
        }

        let Some(row) = row else {
            return Ok(SyncWatermark {
                partition_status,
                ..Default::default()
            });
        };
        Ok(SyncWatermark {
            last_successful_sync_at: parse_optional_timestamp(
                row.last_successful_sync_at.as_deref(),
            )?,
            partition_status,
            last_run_status: row.last_run_status,
            last_run_at: parse_optional_timestamp(row.last_run_at.as_deref())?,
            last_run_duration_ms: row.last_run_duration_ms,
            last_error: row.last_error,
            consecutive_failures: row.consecutive_failures,
        })
    }

    /// Current lease holder, if the lease row exists.
    pub fn current_lease(&self) -> Result<Option<(String, DateTime<Utc>)>> {
        let mut conn = get_connection(&self.pool)?;
        let row = sync_run_lease::table
            .find(1)
            .first::<SyncRunLeaseDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        match row {
            Some(r) => Ok(Some((r.holder, parse_timestamp(&r.expires_at)?))),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl WatermarkStoreTrait for WatermarkRepository {
    fn read(&self) -> Result<SyncWatermark> {
        self.read_impl()
    }

    async fn upsert_partition_status(
        &self,
        partition_id: String,
        status: PartitionStatus,
    ) -> Result<()> {
        self.writer
            .exec(move |conn| {
                let row = SyncPartitionStatusDB::from_domain(partition_id, &status);
                diesel::insert_into(sync_partition_status::table)
                    .values(&row)
                    .on_conflict(sync_partition_status::partition_id)
                    .do_update()
                    .set(&row)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn increment_partition_errors(&self, partition_id: String) -> Result<()> {
        self.writer
            .exec(move |conn| {
                diesel::insert_into(sync_partition_status::table)
                    .values(SyncPartitionStatusDB {
                        partition_id,
                        last_sync_at: None,
                        last_day_synced: None,
                        sessions_processed: 0,
                        error_count: 1,
                    })
                    .on_conflict(sync_partition_status::partition_id)
                    .do_update()
                    .set(sync_partition_status::error_count.eq(sync_partition_status::error_count + 1))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn advance_global_watermark(&self, instant: DateTime<Utc>) -> Result<()> {
        self.writer
            .exec(move |conn| {
                let now = format_timestamp(Utc::now());
                let synced_at = format_timestamp(instant);
                diesel::insert_into(sync_watermark::table)
                    .values(SyncWatermarkDB {
                        last_successful_sync_at: Some(synced_at.clone()),
                        ..SyncWatermarkDB::empty(now.clone())
                    })
                    .on_conflict(sync_watermark::id)
                    .do_update()
                    .set((
                        sync_watermark::last_successful_sync_at.eq(Some(synced_at)),
                        sync_watermark::updated_at.eq(now),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn record_run_outcome(&self, outcome: RunOutcome) -> Result<()> {
        self.writer
            .exec(move |conn| {
                let previous_failures = sync_watermark::table
                    .find(1)
                    .select(sync_watermark::consecutive_failures)
                    .first::<i32>(conn)
                    .optional()
                    .map_err(StorageError::from)?
                    .unwrap_or(0);
                let consecutive_failures = if outcome.is_ok() {
                    0
                } else {
                    previous_failures + 1
                };

                let now = format_timestamp(Utc::now());
                let finished_at = format_timestamp(outcome.finished_at);
                diesel::insert_into(sync_watermark::table)
                    .values(SyncWatermarkDB {
                        last_run_status: Some(outcome.status.clone()),
                        last_run_at: Some(finished_at.clone()),
                        last_run_duration_ms: Some(outcome.duration_ms),
                        last_error: outcome.error.clone(),
                        consecutive_failures,
                        ..SyncWatermarkDB::empty(now.clone())
                    })
                    .on_conflict(sync_watermark::id)
                    .do_update()
                    .set((
                        sync_watermark::last_run_status.eq(Some(outcome.status)),
                        sync_watermark::last_run_at.eq(Some(finished_at)),
                        sync_watermark::last_run_duration_ms.eq(Some(outcome.duration_ms)),
                        sync_watermark::last_error.eq(outcome.error),
                        sync_watermark::consecutive_failures.eq(consecutive_failures),
                        sync_watermark::updated_at.eq(now),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn try_acquire_run_lease(
        &self,
        holder: String,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<LeaseAcquisition> {
        self.writer
            .exec(move |conn| {
                let current = sync_run_lease::table
                    .find(1)
                    .first::<SyncRunLeaseDB>(conn)
                    .optional()
                    .map_err(StorageError::from)?;
                if let Some(current) = current {
                    let expires_at = parse_timestamp(&current.expires_at)?;
                    if expires_at > now && current.holder != holder {
                        return Ok(LeaseAcquisition::Held {
                            holder: current.holder,
                            expires_at,
                        });
                    }
                    debug!(
                        "[VisitSync] Taking over run lease from {} (expired {})",
                        current.holder, current.expires_at
                    );
                }

                let row = SyncRunLeaseDB {
                    id: 1,
                    holder,
                    acquired_at: format_timestamp(now),
                    expires_at: format_timestamp(now + ttl),
                };
                diesel::insert_into(sync_run_lease::table)
                    .values(&row)
                    .on_conflict(sync_run_lease::id)
                    .do_update()
                    .set(&row)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(LeaseAcquisition::Acquired)
            })
            .await
    }

    async fn release_run_lease(&self, holder: String) -> Result<()> {
        self.writer
            .exec(move |conn| {
                diesel::delete(
                    sync_run_lease::table
                        .filter(sync_run_lease::id.eq(1))
                        .filter(sync_run_lease::holder.eq(holder)),
                )
                .execute(conn)
                .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }
}
