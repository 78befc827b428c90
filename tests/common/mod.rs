#![allow(dead_code)]

use std::path::{Path, PathBuf};

use bookings_helper::{BookingStore, GlobalRule, schema::ensure_schema};
use rusqlite::{Connection, params};
use tempfile::TempDir;

pub const AVAILABILITY: &str = r#"[{"bookable":"yes","from":"2024-06-01","to":"2024-08-31","type":"custom"}]"#;

/// Product 42 "Cabin": three booking settings plus one unrelated row,
/// resources 7 (Canoe) and 9 (Sauna) in that order, person 11 (Adult).
/// Product 50 is a plain shop product.
pub fn seed_cabin(conn: &Connection) {
    conn.execute_batch(&format!(
        r#"
        INSERT INTO posts(id, post_type, post_status, post_title, post_content, post_excerpt, post_parent) VALUES
            (42, 'product', 'publish', 'Cabin', 'Lakeside cabin', '', 0),
            (7, 'bookable_resource', 'publish', 'Canoe', '', '', 0),
            (9, 'bookable_resource', 'publish', 'Sauna', '', '', 0),
            (11, 'bookable_person', 'publish', 'Adult', '', 'Ages 18 and up', 42),
            (50, 'product', 'publish', 'Shirt', '', '', 0);
        INSERT INTO postmeta(post_id, meta_key, meta_value) VALUES
            (42, '_wc_booking_duration', '1'),
            (42, '_resource_base_costs', '{{"7":"15","9":"20"}}'),
            (42, '_resource_block_costs', '{{"7":"5"}}'),
            (42, '_price', '100'),
            (7, 'qty', '2'),
            (7, '_wc_booking_availability', '{AVAILABILITY}'),
            (7, '_edit_lock', '1700000000:1'),
            (9, 'qty', '1'),
            (11, 'cost', '10'),
            (11, 'block_cost', '0'),
            (50, '_price', '20');
        INSERT INTO post_terms(post_id, taxonomy, term) VALUES
            (42, 'product_type', 'booking'),
            (50, 'product_type', 'simple');
        INSERT INTO booking_relationships(product_id, resource_id, sort_order) VALUES
            (42, 7, 0),
            (42, 9, 1);
        "#
    ))
    .unwrap();
}

pub fn temp_db() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bookings.db");
    let conn = Connection::open(&path).unwrap();
    ensure_schema(&conn).unwrap();
    (dir, path)
}

pub fn with_connection<F: FnOnce(&Connection)>(path: &Path, f: F) {
    let conn = Connection::open(path).unwrap();
    f(&conn);
}

/// Temp database seeded with the cabin aggregate, opened as a store.
pub fn cabin_store() -> (TempDir, BookingStore) {
    let (dir, path) = temp_db();
    with_connection(&path, seed_cabin);
    let store = BookingStore::open(&path).unwrap();
    (dir, store)
}

pub fn flag_resources(path: &Path, product_id: i64, flag: &str) {
    with_connection(path, |conn| {
        conn.execute(
            "INSERT INTO postmeta(post_id, meta_key, meta_value) VALUES(?1, '_wc_booking_has_resources', ?2)",
            params![product_id, flag],
        )
        .unwrap();
    });
}

pub fn rule(title: &str, ordering: i64) -> GlobalRule {
    GlobalRule {
        id: None,
        gcal_event_id: None,
        title: title.to_string(),
        range_type: "custom".to_string(),
        from_date: "2024-12-24".to_string(),
        to_date: "2024-12-26".to_string(),
        from_range: String::new(),
        to_range: String::new(),
        bookable: "no".to_string(),
        priority: 10,
        ordering,
        date_created: "2024-01-01 00:00:00".to_string(),
        date_modified: "2024-01-02 00:00:00".to_string(),
        rrule: None,
    }
}
