//! Database models for the sync state tables.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use visitsync_core::sync::PartitionStatus;
use visitsync_core::Result;

use crate::db::{format_timestamp, parse_optional_timestamp};

#[derive(
    Queryable,
    Identifiable,
    Insertable,
    AsChangeset,
    Selectable,
    Debug,
    Clone,
    Serialize,
    Deserialize,
)]
#[diesel(table_name = crate::schema::sync_watermark)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SyncWatermarkDB {
    pub id: i32,
    pub last_successful_sync_at: Option<String>,
    pub last_run_status: Option<String>,
    pub last_run_at: Option<String>,
    pub last_run_duration_ms: Option<i64>,
    pub last_error: Option<String>,
    pub consecutive_failures: i32,
    pub updated_at: String,
}

impl SyncWatermarkDB {
    /// Fresh singleton row, used as the insert half of the upserts.
    pub fn empty(updated_at: String) -> Self {
        Self {
            id: 1,
            last_successful_sync_at: None,
            last_run_status: None,
            last_run_at: None,
            last_run_duration_ms: None,
            last_error: None,
            consecutive_failures: 0,
            updated_at,
        }
    }
}

#[derive(
    Queryable,
    Identifiable,
    Insertable,
    AsChangeset,
    Selectable,
    Debug,
    Clone,
    Serialize,
    Deserialize,
)]
#[diesel(primary_key(partition_id))]
#[diesel(table_name = crate::schema::sync_partition_status)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SyncPartitionStatusDB {
    pub partition_id: String,
    pub last_sync_at: Option<String>,
    pub last_day_synced: Option<String>,
    pub sessions_processed: i64,
    pub error_count: i64,
}

impl SyncPartitionStatusDB {
    pub fn from_domain(partition_id: String, status: &PartitionStatus) -> Self {
        Self {
            partition_id,
            last_sync_at: status.last_sync_at.map(format_timestamp),
            last_day_synced: status.last_day_synced.clone(),
            sessions_processed: status.sessions_processed,
            error_count: status.error_count,
        }
    }

    pub fn into_domain(self) -> Result<(String, PartitionStatus)> {
        let status = PartitionStatus {
            last_sync_at: parse_optional_timestamp(self.last_sync_at.as_deref())?,
            last_day_synced: self.last_day_synced,
            sessions_processed: self.sessions_processed,
            error_count: self.error_count,
        };
        Ok((self.partition_id, status))
    }
}

#[derive(
    Queryable,
    Identifiable,
    Insertable,
    AsChangeset,
    Selectable,
    Debug,
    Clone,
    Serialize,
    Deserialize,
)]
#[diesel(table_name = crate::schema::sync_run_lease)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SyncRunLeaseDB {
    pub id: i32,
    pub holder: String,
    pub acquired_at: String,
    pub expires_at: String,
}
