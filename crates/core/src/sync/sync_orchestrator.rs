//! Sync run orchestration.
//!
//! `PLANNING -> SESSION_SYNC -> ANALYTICS_SYNC -> FINALIZING -> DONE`. Planning
//! and session sync are all-or-nothing. Analytics failures are scoped to the
//! partition that raised them, except authentication, which happens once per
//! run. The global watermark only advances when every phase returns.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info, warn};
use uuid::Uuid;

use super::partition_strategy::PartitionStrategy;
use super::sync_model::{
    CorrelationStats, LeaseAcquisition, PartitionOutcome, PartitionStatus, PartitionSyncStatus,
    RunOutcome, SessionSyncStats, SyncPhase, SyncRunReport, SyncWindow,
};
use super::sync_ports::{
    AnalyticsApiTrait, Pagination, SessionSourceTrait, UserRecordStoreTrait, WatermarkStoreTrait,
};
use super::user_correlator::{retain_configured_partitions, UserCorrelator};
use super::window_planner::{plan_window_from_store, WindowSettings};
use crate::config::SyncConfig;
use crate::errors::{Error, Result};

/// Engine-facing subset of the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEngineSettings {
    pub window: WindowSettings,
    pub pagination: Pagination,
    pub partition_ids: Vec<String>,
    pub run_lease_ttl: Duration,
    pub partition_strategy: PartitionStrategy,
}

impl From<&SyncConfig> for SyncEngineSettings {
    fn from(config: &SyncConfig) -> Self {
        Self {
            window: WindowSettings {
                initial_sync_days: config.initial_sync_days,
                sync_buffer_hours: config.sync_buffer_hours,
            },
            pagination: Pagination {
                page_size: config.page_size,
                max_pages: config.max_pages,
            },
            partition_ids: config.partition_ids.clone(),
            run_lease_ttl: Duration::minutes(i64::from(config.run_lease_minutes)),
            partition_strategy: config.partition_strategy(),
        }
    }
}

/// A fatal error together with the phase it aborted.
struct RunFailure {
    phase: SyncPhase,
    error: Error,
}

impl RunFailure {
    fn new(phase: SyncPhase, error: Error) -> Self {
        Self { phase, error }
    }
}

pub struct SyncOrchestrator {
    settings: SyncEngineSettings,
    watermark_store: Arc<dyn WatermarkStoreTrait>,
    session_source: Arc<dyn SessionSourceTrait>,
    analytics_api: Arc<dyn AnalyticsApiTrait>,
    correlator: UserCorrelator,
}

impl SyncOrchestrator {
    pub fn new(
        settings: SyncEngineSettings,
        watermark_store: Arc<dyn WatermarkStoreTrait>,
        user_store: Arc<dyn UserRecordStoreTrait>,
        session_source: Arc<dyn SessionSourceTrait>,
        analytics_api: Arc<dyn AnalyticsApiTrait>,
    ) -> Self {
        Self {
            settings,
            watermark_store,
            session_source,
            analytics_api,
            correlator: UserCorrelator::new(user_store),
        }
    }

    pub fn settings(&self) -> &SyncEngineSettings {
        &self.settings
    }

    /// Runs one full sync starting now.
    pub async fn run(&self) -> Result<SyncRunReport> {
        self.run_at(Utc::now()).await
    }

    /// Runs one full sync whose planning starts at `run_started_at`.
    ///
    /// That instant is both the window end and the value written as the new
    /// watermark, so rows created while the run executes fall into the next
    /// window.
    pub async fn run_at(&self, run_started_at: DateTime<Utc>) -> Result<SyncRunReport> {
        let run_id = Uuid::new_v4().to_string();
        let clock = Instant::now();

        match self
            .watermark_store
            .try_acquire_run_lease(run_id.clone(), run_started_at, self.settings.run_lease_ttl)
            .await?
        {
            LeaseAcquisition::Acquired => {}
            LeaseAcquisition::Held { holder, expires_at } => {
                warn!(
                    "[VisitSync] Skipping run: lease held by {} until {}",
                    holder,
                    expires_at.to_rfc3339()
                );
                return Err(Error::RunInProgress {
                    holder,
                    expires_at: expires_at.to_rfc3339(),
                });
            }
        }

        info!("[VisitSync] Run {} started", run_id);
        let result = self.run_phases(&run_id, run_started_at).await;
        let duration_ms = clock.elapsed().as_millis() as i64;

        let outcome = match &result {
            Ok(_) => RunOutcome {
                status: RunOutcome::OK.to_string(),
                finished_at: Utc::now(),
                duration_ms,
                error: None,
            },
            Err(failure) => RunOutcome {
                status: RunOutcome::FAILED.to_string(),
                finished_at: Utc::now(),
                duration_ms,
                error: Some(format!("{}: {}", failure.phase.as_str(), failure.error)),
            },
        };
        if let Err(err) = self.watermark_store.record_run_outcome(outcome).await {
            warn!("[VisitSync] Failed to record outcome of run {}: {}", run_id, err);
        }
        if let Err(err) = self.watermark_store.release_run_lease(run_id.clone()).await {
            warn!("[VisitSync] Failed to release lease of run {}: {}", run_id, err);
        }

        match result {
            Ok(mut report) => {
                report.duration_ms = duration_ms;
                info!(
                    "[VisitSync] Run {} complete in {}ms: sessions matched={} unmatched={}, websites ok={} failed={}",
                    run_id,
                    duration_ms,
                    report.sessions.matched,
                    report.sessions.unmatched,
                    report.partitions.len() - report.failed_partitions(),
                    report.failed_partitions()
                );
                Ok(report)
            }
            Err(failure) => {
                error!(
                    "[VisitSync] Run {} failed during {}: {}",
                    run_id,
                    failure.phase.as_str(),
                    failure.error
                );
                Err(failure.error)
            }
        }
    }

    async fn run_phases(
        &self,
        run_id: &str,
        run_started_at: DateTime<Utc>,
    ) -> std::result::Result<SyncRunReport, RunFailure> {
        let window = plan_window_from_store(
            self.watermark_store.as_ref(),
            self.settings.window,
            run_started_at,
        )
        .map_err(|e| RunFailure::new(SyncPhase::Planning, e))?;
        info!(
            "[VisitSync] Run {} window {:?}: {} .. {}",
            run_id,
            window.kind,
            window.start.to_rfc3339(),
            window.end.to_rfc3339()
        );

        let sessions = self
            .sync_session_ids(&window)
            .await
            .map_err(|e| RunFailure::new(SyncPhase::SessionSync, e))?;

        let partitions = self
            .sync_analytics(window)
            .await
            .map_err(|e| RunFailure::new(SyncPhase::AnalyticsSync, e))?;

        debug!("[VisitSync] Run {} finalizing", run_id);
        self.watermark_store
            .advance_global_watermark(run_started_at)
            .await
            .map_err(|e| RunFailure::new(SyncPhase::Finalizing, e))?;

        Ok(SyncRunReport {
            run_id: run_id.to_string(),
            started_at: run_started_at,
            window,
            sessions,
            partitions,
            duration_ms: 0,
        })
    }

    async fn sync_session_ids(&self, window: &SyncWindow) -> Result<SessionSyncStats> {
        let rows = self.session_source.fetch_sessions_since(window.start).await?;
        let fetched = rows.len();
        let (rows, dropped_unconfigured) =
            retain_configured_partitions(rows, &self.settings.partition_ids);
        if dropped_unconfigured > 0 {
            info!(
                "[VisitSync] Dropped {} session rows for unconfigured websites",
                dropped_unconfigured
            );
        }

        let mut stats = SessionSyncStats {
            fetched,
            dropped_unconfigured,
            ..Default::default()
        };
        if rows.is_empty() {
            info!("[VisitSync] No new sessions since {}", window.start.to_rfc3339());
            return Ok(stats);
        }

        let correlation = self.correlator.apply_session_ids(&rows).await;
        stats.matched = correlation.matched;
        stats.unmatched = correlation.unmatched;
        stats.failed = correlation.failed;
        info!(
            "[VisitSync] Session sync: {} rows, matched={} unmatched={} failed={}",
            rows.len(),
            stats.matched,
            stats.unmatched,
            stats.failed
        );

        if stats.matched == 0 {
            return Err(Error::NoSessionMatches { rows: rows.len() });
        }
        Ok(stats)
    }

    async fn sync_analytics(&self, window: SyncWindow) -> Result<Vec<PartitionOutcome>> {
        if let Err(err) = self.analytics_api.authenticate().await {
            self.analytics_api.clear_token().await;
            return Err(err);
        }

        let outcomes = self
            .settings
            .partition_strategy
            .run(&self.settings.partition_ids, |partition_id| {
                self.sync_partition(partition_id, window)
            })
            .await;

        self.analytics_api.clear_token().await;
        Ok(outcomes)
    }

    async fn sync_partition(&self, partition_id: String, window: SyncWindow) -> PartitionOutcome {
        let records = match self
            .analytics_api
            .fetch_all_sessions(
                &partition_id,
                window.start,
                window.end,
                self.settings.pagination,
            )
            .await
        {
            Ok(records) => records,
            Err(err) => {
                return self
                    .fail_partition(partition_id, 0, CorrelationStats::default(), err)
                    .await
            }
        };

        let stats = self.correlator.apply_analytics(&partition_id, &records).await;
        info!(
            "[VisitSync] Website {}: {} sessions, matched={} unmatched={} failed={}",
            partition_id,
            records.len(),
            stats.matched,
            stats.unmatched,
            stats.failed
        );

        let status = PartitionStatus {
            last_sync_at: Some(Utc::now()),
            last_day_synced: Some(window.end_day()),
            sessions_processed: records.len() as i64,
            error_count: 0,
        };
        if let Err(err) = self
            .watermark_store
            .upsert_partition_status(partition_id.clone(), status)
            .await
        {
            return self
                .fail_partition(partition_id, records.len(), stats, err)
                .await;
        }

        PartitionOutcome {
            partition_id,
            status: PartitionSyncStatus::Synced,
            fetched: records.len(),
            matched: stats.matched,
            unmatched: stats.unmatched,
            failed: stats.failed,
            error: None,
        }
    }

    async fn fail_partition(
        &self,
        partition_id: String,
        fetched: usize,
        stats: CorrelationStats,
        err: Error,
    ) -> PartitionOutcome {
        warn!(
            "[VisitSync] Website {} failed during {}: {}",
            partition_id,
            SyncPhase::AnalyticsSync.as_str(),
            err
        );
        if let Err(store_err) = self
            .watermark_store
            .increment_partition_errors(partition_id.clone())
            .await
        {
            error!(
                "[VisitSync] Could not record error for website {}: {}",
                partition_id, store_err
            );
        }

        PartitionOutcome {
            partition_id,
            status: PartitionSyncStatus::Failed,
            fetched,
            matched: stats.matched,
            unmatched: stats.unmatched,
            failed: stats.failed,
            error: Some(err.to_string()),
        }
    }
}
