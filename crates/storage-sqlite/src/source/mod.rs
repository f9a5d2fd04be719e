//! Relational session source: reads newly created sessions from the analytics
//! product's own database.
//!
//! The pool is built on first use so the process can start (and the `check`
//! command can report) while the source is down. The database is opened
//! read-only and every failure surfaces as `Error::SourceUnavailable`.

mod model;
mod schema;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::sqlite::SqliteConnection;
use log::{debug, info};
use tokio::sync::OnceCell;

use visitsync_core::errors::{Error, Result};
use visitsync_core::sync::{SessionRecord, SessionSourceTrait};

pub use model::SessionRowDB;
use schema::session;

type SourcePool = Pool<ConnectionManager<SqliteConnection>>;

const SOURCE_POOL_MAX_SIZE: u32 = 2;
const SOURCE_CONNECT_TIMEOUT_SECS: u64 = 5;

pub struct SqlSessionSource {
    database_url: String,
    pool: OnceCell<Arc<SourcePool>>,
}

impl SqlSessionSource {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            pool: OnceCell::new(),
        }
    }

    async fn pool(&self) -> Result<Arc<SourcePool>> {
        let pool = self
            .pool
            .get_or_try_init(|| async {
                let url = self.database_url.clone();
                let pool = tokio::task::spawn_blocking(move || build_pool(&url))
                    .await
                    .map_err(|e| Error::source_unavailable(e.to_string()))??;
                info!("[VisitSync] Session source pool ready");
                Ok::<_, Error>(Arc::new(pool))
            })
            .await?;
        Ok(Arc::clone(pool))
    }

    async fn with_connection<F, T>(&self, query: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> QueryResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool().await?;
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| Error::source_unavailable(e.to_string()))?;
            query(&mut conn).map_err(|e| Error::source_unavailable(e.to_string()))
        })
        .await
        .map_err(|e| Error::source_unavailable(e.to_string()))?
    }
}

/// SQLite URI that opens `database_url` read-only, so a missing file fails
/// instead of being created.
pub(crate) fn read_only_uri(database_url: &str) -> String {
    let path = database_url
        .strip_prefix("sqlite://")
        .unwrap_or(database_url);
    if path.starts_with("file:") {
        let separator = if path.contains('?') { '&' } else { '?' };
        return format!("{}{}mode=ro", path, separator);
    }
    let escaped = path
        .replace('%', "%25")
        .replace('?', "%3f")
        .replace('#', "%23");
    format!("file:{}?mode=ro", escaped)
}

fn build_pool(database_url: &str) -> Result<SourcePool> {
    Pool::builder()
        .max_size(SOURCE_POOL_MAX_SIZE)
        .connection_timeout(Duration::from_secs(SOURCE_CONNECT_TIMEOUT_SECS))
        .build(ConnectionManager::<SqliteConnection>::new(read_only_uri(
            database_url,
        )))
        .map_err(|e| Error::source_unavailable(e.to_string()))
}

#[async_trait]
impl SessionSourceTrait for SqlSessionSource {
    async fn fetch_sessions_since(&self, start: DateTime<Utc>) -> Result<Vec<SessionRecord>> {
        let since = start.naive_utc();
        let rows = self
            .with_connection(move |conn| {
                session::table
                    .filter(session::created_at.ge(since))
                    .filter(session::distinct_id.is_not_null())
                    .filter(session::distinct_id.ne(""))
                    .order(session::created_at.asc())
                    .select(SessionRowDB::as_select())
                    .load::<SessionRowDB>(conn)
            })
            .await?;
        debug!(
            "[VisitSync] Session source returned {} rows since {}",
            rows.len(),
            start.to_rfc3339()
        );
        Ok(rows.into_iter().map(SessionRecord::from).collect())
    }

    async fn check_connection(&self) -> Result<()> {
        self.with_connection(|conn| {
            session::table
                .select(session::session_id)
                .limit(1)
                .load::<String>(conn)
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use tempfile::{tempdir, TempDir};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    fn row(session_id: &str, minutes_before: i64, distinct_id: Option<&str>) -> SessionRowDB {
        SessionRowDB {
            session_id: session_id.to_string(),
            website_id: "site-a".to_string(),
            created_at: (t0() - ChronoDuration::minutes(minutes_before)).naive_utc(),
            distinct_id: distinct_id.map(str::to_string),
        }
    }

    fn seeded_source(rows: Vec<SessionRowDB>) -> (SqlSessionSource, TempDir) {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("analytics.db").to_string_lossy().to_string();
        let mut conn = SqliteConnection::establish(&path).expect("open source db");
        diesel::sql_query(
            "CREATE TABLE session (
                session_id TEXT NOT NULL PRIMARY KEY,
                website_id TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL,
                distinct_id TEXT
            )",
        )
        .execute(&mut conn)
        .expect("create table");
        if !rows.is_empty() {
            diesel::insert_into(session::table)
                .values(&rows)
                .execute(&mut conn)
                .expect("seed rows");
        }
        (SqlSessionSource::new(format!("sqlite://{}", path)), dir)
    }

    #[tokio::test]
    async fn returns_identified_rows_since_start_oldest_first() {
        let (source, _dir) = seeded_source(vec![
            row("s-late", 5, Some("b@example.com")),
            row("s-early", 50, Some("a@example.com")),
            row("s-old", 600, Some("c@example.com")),
            row("s-anon", 10, None),
            row("s-blank", 20, Some("")),
        ]);

        let rows = source
            .fetch_sessions_since(t0() - ChronoDuration::hours(2))
            .await
            .expect("fetch");

        assert_eq!(
            rows.iter().map(|r| r.session_id.as_str()).collect::<Vec<_>>(),
            vec!["s-early", "s-late"]
        );
        assert_eq!(rows[0].identity, "a@example.com");
        assert_eq!(rows[0].partition_id, "site-a");
        assert_eq!(rows[0].created_at, t0() - ChronoDuration::minutes(50));
    }

    #[tokio::test]
    async fn start_bound_is_inclusive() {
        let (source, _dir) = seeded_source(vec![row("s-edge", 60, Some("a@example.com"))]);
        let rows = source
            .fetch_sessions_since(t0() - ChronoDuration::minutes(60))
            .await
            .expect("fetch");
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn connection_check_succeeds_on_seeded_source() {
        let (source, _dir) = seeded_source(vec![]);
        source.check_connection().await.expect("check");
    }

    #[tokio::test]
    async fn unreachable_source_is_reported_as_unavailable() {
        let source = SqlSessionSource::new("/nonexistent-dir/for/visitsync/analytics.db");
        let err = source
            .fetch_sessions_since(t0())
            .await
            .expect_err("source is down");
        assert!(matches!(err, Error::SourceUnavailable(_)));
        assert!(matches!(
            source.check_connection().await,
            Err(Error::SourceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn missing_session_table_is_reported_as_unavailable() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("empty.db").to_string_lossy().to_string();
        SqliteConnection::establish(&path).expect("create empty db");
        let source = SqlSessionSource::new(path);
        let err = source.fetch_sessions_since(t0()).await.expect_err("no table");
        assert!(matches!(err, Error::SourceUnavailable(_)));
    }

    #[tokio::test]
    async fn missing_database_file_is_never_created() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("analytics.db");
        let source = SqlSessionSource::new(format!("sqlite://{}", path.display()));

        let err = source.check_connection().await.expect_err("file is missing");
        assert!(matches!(err, Error::SourceUnavailable(_)));
        assert!(!path.exists());
    }

    #[test]
    fn source_urls_become_read_only_uris() {
        assert_eq!(
            read_only_uri("sqlite:///var/lib/analytics.db"),
            "file:/var/lib/analytics.db?mode=ro"
        );
        assert_eq!(read_only_uri("data/a?b#c.db"), "file:data/a%3fb%23c.db?mode=ro");
        assert_eq!(
            read_only_uri("file:/srv/a.db?cache=shared"),
            "file:/srv/a.db?cache=shared&mode=ro"
        );
    }
}
