//! Database model for user records.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use visitsync_core::sync::{AnalyticsRecord, UserRecord};
use visitsync_core::{Error, Result};

use crate::db::parse_timestamp;

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
#[diesel(primary_key(identity))]
#[diesel(table_name = crate::schema::users)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct UserDB {
    pub identity: String,
    pub session_id: Option<String>,
    /// JSON snapshot of the last applied `AnalyticsRecord`.
    pub analytics: Option<String>,
    pub updated_at: String,
}

impl TryFrom<UserDB> for UserRecord {
    type Error = Error;

    fn try_from(db: UserDB) -> Result<Self> {
        let analytics = db
            .analytics
            .as_deref()
            .map(serde_json::from_str::<AnalyticsRecord>)
            .transpose()?;
        Ok(UserRecord {
            identity: db.identity,
            session_id: db.session_id,
            analytics,
            updated_at: parse_timestamp(&db.updated_at)?,
        })
    }
}
