//! Merges session rows and analytics rows into existing user records.
//!
//! Updates are issued one record at a time. Unmatched rows are expected
//! (anonymous visits); a failed update is logged and counted without
//! stopping the batch.

use std::sync::Arc;

use log::{debug, warn};

use super::sync_model::{AnalyticsRecord, CorrelationStats, SessionRecord};
use super::sync_ports::UserRecordStoreTrait;

/// Canonical form of an identity used as the session-sync match key.
pub fn normalize_identity(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Keeps rows whose partition is configured. Returns the kept rows and the
/// number dropped.
pub fn retain_configured_partitions(
    rows: Vec<SessionRecord>,
    partition_ids: &[String],
) -> (Vec<SessionRecord>, usize) {
    let total = rows.len();
    let kept: Vec<SessionRecord> = rows
        .into_iter()
        .filter(|row| partition_ids.iter().any(|id| id == &row.partition_id))
        .collect();
    let dropped = total - kept.len();
    (kept, dropped)
}

#[derive(Clone)]
pub struct UserCorrelator {
    users: Arc<dyn UserRecordStoreTrait>,
}

impl UserCorrelator {
    pub fn new(users: Arc<dyn UserRecordStoreTrait>) -> Self {
        Self { users }
    }

    /// Writes each row's session id onto the user matched by identity.
    pub async fn apply_session_ids(&self, rows: &[SessionRecord]) -> CorrelationStats {
        let mut stats = CorrelationStats::default();
        for row in rows {
            let identity = normalize_identity(&row.identity);
            if identity.is_empty() {
                debug!(
                    "[VisitSync] Session {} has an empty identity; skipping",
                    row.session_id
                );
                stats.unmatched += 1;
                continue;
            }

            match self
                .users
                .set_session_id_by_identity(identity.clone(), row.session_id.clone())
                .await
            {
                Ok(0) => {
                    debug!(
                        "[VisitSync] Unmatched session {}: no user with identity {}",
                        row.session_id, identity
                    );
                    stats.unmatched += 1;
                }
                Ok(_) => stats.matched += 1,
                Err(err) => {
                    warn!(
                        "[VisitSync] Failed to set session {} on user {}: {}",
                        row.session_id, identity, err
                    );
                    stats.failed += 1;
                }
            }
        }
        stats
    }

    /// Writes each analytics record onto the user(s) holding its session id.
    pub async fn apply_analytics(
        &self,
        partition_id: &str,
        records: &[AnalyticsRecord],
    ) -> CorrelationStats {
        let mut stats = CorrelationStats::default();
        for record in records {
            match self
                .users
                .set_analytics_by_session_id(record.session_id.clone(), record.clone())
                .await
            {
                Ok(0) => stats.unmatched += 1,
                Ok(updated) => {
                    if updated > 1 {
                        debug!(
                            "[VisitSync] Session {} is shared by {} users",
                            record.session_id, updated
                        );
                    }
                    stats.matched += 1;
                }
                Err(err) => {
                    warn!(
                        "[VisitSync] Failed to apply analytics for session {} (website {}): {}",
                        record.session_id, partition_id, err
                    );
                    stats.failed += 1;
                }
            }
        }
        stats
    }
}
