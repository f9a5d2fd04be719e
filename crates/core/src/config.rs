//! Flat key/value configuration resolved once at process start.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::errors::{Error, Result};
use crate::sync::PartitionStrategy;

pub const SYNC_INITIAL_DAYS_KEY: &str = "SYNC_INITIAL_DAYS";
pub const SYNC_BUFFER_HOURS_KEY: &str = "SYNC_BUFFER_HOURS";
pub const ANALYTICS_PAGE_SIZE_KEY: &str = "ANALYTICS_PAGE_SIZE";
pub const ANALYTICS_MAX_PAGES_KEY: &str = "ANALYTICS_MAX_PAGES";
pub const ANALYTICS_WEBSITE_IDS_KEY: &str = "ANALYTICS_WEBSITE_IDS";
pub const ANALYTICS_API_URL_KEY: &str = "ANALYTICS_API_URL";
pub const ANALYTICS_API_USERNAME_KEY: &str = "ANALYTICS_API_USERNAME";
pub const ANALYTICS_API_PASSWORD_KEY: &str = "ANALYTICS_API_PASSWORD";
pub const SOURCE_DATABASE_URL_KEY: &str = "SOURCE_DATABASE_URL";
pub const STORE_DATABASE_URL_KEY: &str = "STORE_DATABASE_URL";
pub const SYNC_INTERVAL_MINUTES_KEY: &str = "SYNC_INTERVAL_MINUTES";
pub const SYNC_RUN_LEASE_MINUTES_KEY: &str = "SYNC_RUN_LEASE_MINUTES";
pub const SYNC_PARTITION_CONCURRENCY_KEY: &str = "SYNC_PARTITION_CONCURRENCY";

pub const DEFAULT_INITIAL_SYNC_DAYS: u32 = 7;
pub const DEFAULT_SYNC_BUFFER_HOURS: u32 = 12;
pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const DEFAULT_MAX_PAGES: u32 = 1000;
pub const DEFAULT_SYNC_INTERVAL_MINUTES: u32 = 60;
pub const DEFAULT_RUN_LEASE_MINUTES: u32 = 60;

pub const MAX_INITIAL_SYNC_DAYS: u32 = 3650;
pub const MAX_SYNC_BUFFER_HOURS: u32 = 8760;

/// Read access to a flat string configuration map.
pub trait ConfigSource: Send + Sync {
    fn get_config(&self, key: &str) -> Option<String>;
}

/// Reads configuration from the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvConfigSource;

impl ConfigSource for EnvConfigSource {
    fn get_config(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl ConfigSource for HashMap<String, String> {
    fn get_config(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// A secrets file holding a flat JSON object of string values.
#[derive(Debug, Clone, Default)]
pub struct JsonFileConfigSource {
    values: HashMap<String, String>,
}

impl JsonFileConfigSource {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let values: HashMap<String, String> = serde_json::from_str(raw)
            .map_err(|e| Error::config(format!("Secrets file is not a flat string map: {}", e)))?;
        Ok(Self { values })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read secrets file {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&raw)
    }
}

impl ConfigSource for JsonFileConfigSource {
    fn get_config(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// First layer that has a key wins.
#[derive(Default)]
pub struct LayeredConfigSource {
    layers: Vec<Box<dyn ConfigSource>>,
}

impl LayeredConfigSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_layer(mut self, layer: impl ConfigSource + 'static) -> Self {
        self.layers.push(Box::new(layer));
        self
    }
}

impl ConfigSource for LayeredConfigSource {
    fn get_config(&self, key: &str) -> Option<String> {
        self.layers.iter().find_map(|layer| layer.get_config(key))
    }
}

/// Validated engine configuration.
#[derive(Clone)]
pub struct SyncConfig {
    pub initial_sync_days: u32,
    pub sync_buffer_hours: u32,
    pub page_size: u32,
    pub max_pages: u32,
    pub partition_ids: Vec<String>,
    pub api_base_url: String,
    pub api_username: String,
    pub api_password: String,
    pub source_database_url: String,
    pub store_database_url: String,
    pub sync_interval_minutes: u32,
    pub run_lease_minutes: u32,
    pub partition_concurrency: u32,
}

impl fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncConfig")
            .field("initial_sync_days", &self.initial_sync_days)
            .field("sync_buffer_hours", &self.sync_buffer_hours)
            .field("page_size", &self.page_size)
            .field("max_pages", &self.max_pages)
            .field("partition_ids", &self.partition_ids)
            .field("api_base_url", &self.api_base_url)
            .field("api_username", &self.api_username)
            .field("api_password", &"<redacted>")
            .field("source_database_url", &self.source_database_url)
            .field("store_database_url", &self.store_database_url)
            .field("sync_interval_minutes", &self.sync_interval_minutes)
            .field("run_lease_minutes", &self.run_lease_minutes)
            .field("partition_concurrency", &self.partition_concurrency)
            .finish()
    }
}

fn required(source: &dyn ConfigSource, key: &str) -> Result<String> {
    source
        .get_config(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::config(format!("{} is not configured", key)))
}

fn positive_or_default(source: &dyn ConfigSource, key: &str, default: u32) -> Result<u32> {
    bounded_or_default(source, key, default, u32::MAX)
}

fn bounded_or_default(
    source: &dyn ConfigSource,
    key: &str,
    default: u32,
    max: u32,
) -> Result<u32> {
    let Some(raw) = source
        .get_config(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
    else {
        return Ok(default);
    };

    match raw.parse::<u32>() {
        Ok(value) if value > max => Err(Error::config(format!(
            "{} must be at most {}, got {}",
            key, max, value
        ))),
        Ok(value) if value > 0 => Ok(value),
        _ => Err(Error::config(format!(
            "{} must be a positive integer, got '{}'",
            key, raw
        ))),
    }
}

/// Splits a comma-separated id list, dropping blanks and duplicates while keeping order.
pub fn parse_partition_ids(raw: &str) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for id in raw.split(',').map(str::trim).filter(|id| !id.is_empty()) {
        if !ids.iter().any(|existing| existing == id) {
            ids.push(id.to_string());
        }
    }
    ids
}

impl SyncConfig {
    pub fn from_source(source: &dyn ConfigSource) -> Result<Self> {
        let partition_ids = parse_partition_ids(&required(source, ANALYTICS_WEBSITE_IDS_KEY)?);
        if partition_ids.is_empty() {
            return Err(Error::config(format!(
                "{} contains no website ids",
                ANALYTICS_WEBSITE_IDS_KEY
            )));
        }

        Ok(Self {
            initial_sync_days: bounded_or_default(
                source,
                SYNC_INITIAL_DAYS_KEY,
                DEFAULT_INITIAL_SYNC_DAYS,
                MAX_INITIAL_SYNC_DAYS,
            )?,
            sync_buffer_hours: bounded_or_default(
                source,
                SYNC_BUFFER_HOURS_KEY,
                DEFAULT_SYNC_BUFFER_HOURS,
                MAX_SYNC_BUFFER_HOURS,
            )?,
            page_size: positive_or_default(source, ANALYTICS_PAGE_SIZE_KEY, DEFAULT_PAGE_SIZE)?,
            max_pages: positive_or_default(source, ANALYTICS_MAX_PAGES_KEY, DEFAULT_MAX_PAGES)?,
            partition_ids,
            api_base_url: required(source, ANALYTICS_API_URL_KEY)?
                .trim_end_matches('/')
                .to_string(),
            api_username: required(source, ANALYTICS_API_USERNAME_KEY)?,
            api_password: required(source, ANALYTICS_API_PASSWORD_KEY)?,
            source_database_url: required(source, SOURCE_DATABASE_URL_KEY)?,
            store_database_url: required(source, STORE_DATABASE_URL_KEY)?,
            sync_interval_minutes: positive_or_default(
                source,
                SYNC_INTERVAL_MINUTES_KEY,
                DEFAULT_SYNC_INTERVAL_MINUTES,
            )?,
            run_lease_minutes: positive_or_default(
                source,
                SYNC_RUN_LEASE_MINUTES_KEY,
                DEFAULT_RUN_LEASE_MINUTES,
            )?,
            partition_concurrency: positive_or_default(source, SYNC_PARTITION_CONCURRENCY_KEY, 1)?,
        })
    }

    pub fn partition_strategy(&self) -> PartitionStrategy {
        PartitionStrategy::from_concurrency(self.partition_concurrency as usize)
    }
}
