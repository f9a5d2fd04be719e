use chrono::{NaiveDateTime, TimeZone, Utc};
use diesel::prelude::*;

use visitsync_core::sync::SessionRecord;

#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = super::schema::session)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SessionRowDB {
    pub session_id: String,
    pub website_id: String,
    pub created_at: NaiveDateTime,
    pub distinct_id: Option<String>,
}

impl From<SessionRowDB> for SessionRecord {
    fn from(row: SessionRowDB) -> Self {
        SessionRecord {
            session_id: row.session_id,
            partition_id: row.website_id,
            created_at: Utc.from_utc_datetime(&row.created_at),
            identity: row.distinct_id.unwrap_or_default(),
        }
    }
}
