use rusqlite::Connection;

use crate::errors::BookingsHelperError;

pub fn ensure_schema(conn: &Connection) -> Result<(), BookingsHelperError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS posts (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            post_type    TEXT NOT NULL,
            post_status  TEXT NOT NULL DEFAULT 'publish',
            post_title   TEXT NOT NULL DEFAULT '',
            post_content TEXT NOT NULL DEFAULT '',
            post_excerpt TEXT NOT NULL DEFAULT '',
            post_parent  INTEGER NOT NULL DEFAULT 0
        );
        CREATE TABLE IF NOT EXISTS postmeta (
            meta_id    INTEGER PRIMARY KEY AUTOINCREMENT,
            post_id    INTEGER NOT NULL,
            meta_key   TEXT NOT NULL,
            meta_value TEXT NOT NULL DEFAULT ''
        );
        CREATE TABLE IF NOT EXISTS post_terms (
            post_id  INTEGER NOT NULL,
            taxonomy TEXT NOT NULL,
            term     TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS booking_relationships (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            product_id  INTEGER NOT NULL,
            resource_id INTEGER NOT NULL,
            sort_order  INTEGER NOT NULL DEFAULT 0
        );
        CREATE TABLE IF NOT EXISTS bookings_availability (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            gcal_event_id TEXT NOT NULL DEFAULT '',
            title         TEXT NOT NULL DEFAULT '',
            range_type    TEXT NOT NULL DEFAULT '',
            from_date     TEXT NOT NULL DEFAULT '',
            to_date       TEXT NOT NULL DEFAULT '',
            from_range    TEXT NOT NULL DEFAULT '',
            to_range      TEXT NOT NULL DEFAULT '',
            bookable      TEXT NOT NULL DEFAULT '',
            priority      INTEGER NOT NULL DEFAULT 10,
            ordering      INTEGER NOT NULL DEFAULT 0,
            date_created  TEXT NOT NULL DEFAULT '',
            date_modified TEXT NOT NULL DEFAULT '',
            rrule         TEXT NOT NULL DEFAULT ''
        );
        CREATE TABLE IF NOT EXISTS options (
            option_name  TEXT PRIMARY KEY,
            option_value TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_posts_type_parent ON posts(post_type, post_parent);
        CREATE INDEX IF NOT EXISTS idx_postmeta_post_key ON postmeta(post_id, meta_key);
        CREATE INDEX IF NOT EXISTS idx_terms_post ON post_terms(post_id, taxonomy);
        CREATE INDEX IF NOT EXISTS idx_relationships_product ON booking_relationships(product_id);
        "#,
    )
    .map_err(|e| BookingsHelperError::schema(e.to_string()))?;
    Ok(())
}
