//! Entry points behind the CLI subcommands.

use serde::Serialize;
use tokio::sync::watch;

use visitsync_core::sync::{
    next_tick_delay, AnalyticsApiTrait, SessionSourceTrait, SyncRunReport, WatermarkStoreTrait,
};
use visitsync_core::Error;

use crate::context::ServiceContext;

/// One full sync. Errors carry the engine error unchanged.
pub async fn run_once(ctx: &ServiceContext) -> Result<SyncRunReport, Error> {
    match ctx.orchestrator.run().await {
        Ok(report) => {
            for partition in report.partitions.iter().filter(|p| p.error.is_some()) {
                tracing::warn!(
                    partition_id = %partition.partition_id,
                    error = partition.error.as_deref().unwrap_or_default(),
                    "website sync failed"
                );
            }
            tracing::info!(
                run_id = %report.run_id,
                window_kind = ?report.window.kind,
                matched = report.sessions.matched,
                unmatched = report.sessions.unmatched,
                failed_websites = report.failed_partitions(),
                duration_ms = report.duration_ms,
                "sync run finished"
            );
            Ok(report)
        }
        Err(err) => {
            tracing::error!(code = err.code(), error = %err, "sync run failed");
            Err(err)
        }
    }
}

/// Runs one sync per tick until `shutdown` flips to true. Runs never overlap:
/// the next tick is only scheduled after the current run returns.
pub async fn serve(ctx: &ServiceContext, mut shutdown: watch::Receiver<bool>) {
    tracing::info!(
        interval_minutes = ctx.config.sync_interval_minutes,
        websites = ctx.config.partition_ids.len(),
        "scheduler started"
    );
    loop {
        if *shutdown.borrow() {
            break;
        }
        if let Err(Error::RunInProgress { holder, expires_at }) = run_once(ctx).await {
            tracing::info!(%holder, %expires_at, "another instance is syncing; skipped tick");
        }
        if *shutdown.borrow() {
            break;
        }

        let delay = next_tick_delay(ctx.config.sync_interval_minutes);
        tracing::debug!(delay_secs = delay.as_secs(), "next sync scheduled");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    tracing::info!("scheduler stopped");
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProbeResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProbeResult {
    fn from_result<T>(result: Result<T, Error>) -> Self {
        match result {
            Ok(_) => Self {
                ok: true,
                error: None,
            },
            Err(err) => Self {
                ok: false,
                error: Some(err.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivityReport {
    pub store: ProbeResult,
    pub session_source: ProbeResult,
    pub analytics_api: ProbeResult,
}

impl ConnectivityReport {
    pub fn all_ok(&self) -> bool {
        self.store.ok && self.session_source.ok && self.analytics_api.ok
    }
}

/// Probes each dependency independently; one failure does not skip the others.
pub async fn check(ctx: &ServiceContext) -> ConnectivityReport {
    let store = ProbeResult::from_result(ctx.watermark_store.read());
    let session_source = ProbeResult::from_result(ctx.session_source.check_connection().await);

    let api_result = match ctx.analytics_api.authenticate().await {
        Ok(_) => ctx.analytics_api.verify().await,
        Err(err) => Err(err),
    };
    ctx.analytics_api.clear_token().await;
    let analytics_api = ProbeResult::from_result(api_result);

    for (name, probe) in [
        ("store", &store),
        ("session_source", &session_source),
        ("analytics_api", &analytics_api),
    ] {
        match &probe.error {
            None => tracing::info!(dependency = name, "reachable"),
            Some(error) => tracing::warn!(dependency = name, %error, "unreachable"),
        }
    }

    ConnectivityReport {
        store,
        session_source,
        analytics_api,
    }
}

pub fn watermark_json(ctx: &ServiceContext) -> anyhow::Result<String> {
    let watermark = ctx.watermark_store.read()?;
    Ok(serde_json::to_string_pretty(&watermark)?)
}
