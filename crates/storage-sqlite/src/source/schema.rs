//! Read-only view of the analytics product's `session` table.

diesel::table! {
    session (session_id) {
        session_id -> Text,
        website_id -> Text,
        created_at -> Timestamp,
        distinct_id -> Nullable<Text>,
    }
}
