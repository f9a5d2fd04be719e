use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::SqliteConnection;
use std::sync::Arc;

use visitsync_core::sync::{AnalyticsRecord, UserRecord, UserRecordStoreTrait};
use visitsync_core::Result;

use super::model::UserDB;
use crate::db::{format_timestamp, get_connection, WriteHandle};
use crate::errors::StorageError;
use crate::schema::users;

pub struct UserRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl UserRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        UserRepository { pool, writer }
    }

    /// Creates a user record if none exists for `identity`. Returns whether a
    /// record was created.
    pub async fn ensure_user(&self, identity: String) -> Result<bool> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<bool> {
                let inserted = diesel::insert_into(users::table)
                    .values(UserDB {
                        identity,
                        session_id: None,
                        analytics: None,
                        updated_at: format_timestamp(Utc::now()),
                    })
                    .on_conflict(users::identity)
                    .do_nothing()
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(inserted > 0)
            })
            .await
    }

    pub fn count_users(&self) -> Result<i64> {
        let mut conn = get_connection(&self.pool)?;
        let count = users::table
            .count()
            .get_result::<i64>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(count)
    }
}

#[async_trait]
impl UserRecordStoreTrait for UserRepository {
    async fn set_session_id_by_identity(
        &self,
        identity: String,
        session_id: String,
    ) -> Result<usize> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<usize> {
                // `identity` is declared COLLATE NOCASE.
                let updated = diesel::update(users::table.filter(users::identity.eq(identity)))
                    .set((
                        users::session_id.eq(Some(session_id)),
                        users::updated_at.eq(format_timestamp(Utc::now())),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(updated)
            })
            .await
    }

    async fn set_analytics_by_session_id(
        &self,
        session_id: String,
        analytics: AnalyticsRecord,
    ) -> Result<usize> {
        let payload = serde_json::to_string(&analytics)?;
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<usize> {
                let updated = diesel::update(
                    users::table.filter(users::session_id.eq(Some(session_id))),
                )
                .set((
                    users::analytics.eq(Some(payload)),
                    users::updated_at.eq(format_timestamp(Utc::now())),
                ))
                .execute(conn)
                .map_err(StorageError::from)?;
                Ok(updated)
            })
            .await
    }

    fn find_by_identity(&self, identity: &str) -> Result<Option<UserRecord>> {
        let mut conn = get_connection(&self.pool)?;
        let row = users::table
            .filter(users::identity.eq(identity))
            .select(UserDB::as_select())
            .first::<UserDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        row.map(UserRecord::try_from).transpose()
    }
}
