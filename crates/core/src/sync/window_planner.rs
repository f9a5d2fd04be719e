//! Chooses the instant range a run has to (re)process.

use chrono::{DateTime, Duration, Utc};
use log::debug;

use super::sync_model::{SyncWatermark, SyncWindow, WindowKind};
use super::sync_ports::WatermarkStoreTrait;
use crate::errors::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSettings {
    pub initial_sync_days: u32,
    pub sync_buffer_hours: u32,
}

/// Plans the window from an already loaded watermark.
///
/// Incremental windows start `sync_buffer_hours` before the last successful
/// sync so late rows get picked up; the start never passes `now`. A start
/// outside the representable range is a configuration error.
pub fn plan_window(
    watermark: &SyncWatermark,
    settings: WindowSettings,
    now: DateTime<Utc>,
) -> Result<SyncWindow> {
    match watermark.last_successful_sync_at {
        None => {
            let start = Duration::try_days(i64::from(settings.initial_sync_days))
                .and_then(|lookback| now.checked_sub_signed(lookback))
                .ok_or_else(|| {
                    Error::config(format!(
                        "initial lookback of {} days is out of range",
                        settings.initial_sync_days
                    ))
                })?;
            Ok(SyncWindow {
                start,
                end: now,
                kind: WindowKind::Initial,
            })
        }
        Some(last_sync_at) => {
            let start = Duration::try_hours(i64::from(settings.sync_buffer_hours))
                .and_then(|buffer| last_sync_at.checked_sub_signed(buffer))
                .ok_or_else(|| {
                    Error::config(format!(
                        "sync buffer of {} hours is out of range",
                        settings.sync_buffer_hours
                    ))
                })?;
            Ok(SyncWindow {
                start: start.min(now),
                end: now,
                kind: WindowKind::Incremental,
            })
        }
    }
}

/// Reads the watermark and plans the window. A store read failure is fatal.
pub fn plan_window_from_store(
    store: &dyn WatermarkStoreTrait,
    settings: WindowSettings,
    now: DateTime<Utc>,
) -> Result<SyncWindow> {
    let watermark = store.read()?;
    let window = plan_window(&watermark, settings, now)?;
    debug!(
        "[VisitSync] Planned {:?} window {} .. {} (last success: {:?})",
        window.kind,
        window.start.to_rfc3339(),
        window.end.to_rfc3339(),
        watermark.last_successful_sync_at.map(|t| t.to_rfc3339())
    );
    Ok(window)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SETTINGS: WindowSettings = WindowSettings {
        initial_sync_days: 7,
        sync_buffer_hours: 12,
    };

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 20, 9, 30, 0).unwrap()
    }

    #[test]
    fn initial_window_looks_back_configured_days() {
        let window = plan_window(&SyncWatermark::default(), SETTINGS, now()).unwrap();
        assert_eq!(window.kind, WindowKind::Initial);
        assert_eq!(window.start, now() - Duration::days(7));
        assert_eq!(window.end, now());
    }

    #[test]
    fn incremental_window_starts_buffer_hours_before_last_success() {
        let last = Utc.with_ymd_and_hms(2026, 5, 20, 8, 0, 0).unwrap();
        let watermark = SyncWatermark {
            last_successful_sync_at: Some(last),
            ..Default::default()
        };
        let window = plan_window(&watermark, SETTINGS, now()).unwrap();
        assert_eq!(window.kind, WindowKind::Incremental);
        assert_eq!(window.start, last - Duration::hours(12));
        assert_eq!(window.end, now());
    }

    #[test]
    fn watermark_in_the_future_is_clamped_to_now() {
        let watermark = SyncWatermark {
            last_successful_sync_at: Some(now() + Duration::days(2)),
            ..Default::default()
        };
        let window = plan_window(&watermark, SETTINGS, now()).unwrap();
        assert_eq!(window.start, now());
        assert_eq!(window.end, now());
    }

    #[test]
    fn out_of_range_lookback_fails_instead_of_panicking() {
        let settings = WindowSettings {
            initial_sync_days: 200_000_000,
            sync_buffer_hours: 12,
        };
        let result = plan_window(&SyncWatermark::default(), settings, now());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn out_of_range_buffer_fails_instead_of_panicking() {
        let settings = WindowSettings {
            initial_sync_days: 7,
            sync_buffer_hours: u32::MAX,
        };
        let watermark = SyncWatermark {
            last_successful_sync_at: Some(now()),
            ..Default::default()
        };
        let result = plan_window(&watermark, settings, now());
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
