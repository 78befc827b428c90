mod common;

use bookings_helper::{
    BookingStore, BookingsHelperError, GraphExtractor, ProductType,
    extract::{PRODUCT_NOT_FOUND, RESOURCE_META},
};
use common::{AVAILABILITY, cabin_store, seed_cabin, temp_db, with_connection};

#[test]
fn test_extract_root_collects_aggregate() {
    let (_dir, store) = cabin_store();
    let doc = GraphExtractor::new(&store).extract_root(42).unwrap();

    assert_eq!(doc.product.id, 42);
    assert_eq!(doc.product.post_title, "Cabin");
    assert_eq!(doc.product.post_content, "Lakeside cabin");
    assert_eq!(doc.product.product_type().unwrap(), ProductType::Booking);

    let keys: Vec<&str> = doc.product_meta.iter().map(|m| m.meta_key.as_str()).collect();
    assert_eq!(
        keys,
        vec!["_wc_booking_duration", "_resource_base_costs", "_resource_block_costs"]
    );

    let resources: Vec<i64> = doc.resources.iter().map(|r| r.resource.id).collect();
    assert_eq!(resources, vec![7, 9]);
    let canoe = &doc.resources[0];
    assert_eq!(canoe.resource.post_title, "Canoe");
    assert_eq!(canoe.resource_meta.len(), 2);
    assert!(canoe.resource_meta.iter().all(|m| RESOURCE_META.matches(&m.meta_key)));
    assert_eq!(canoe.resource_meta[1].meta_value, AVAILABILITY);

    assert_eq!(doc.persons.len(), 1);
    assert_eq!(doc.persons[0].person.post_excerpt, "Ages 18 and up");
    assert_eq!(doc.persons[0].person_meta.len(), 2);
}

#[test]
fn test_extract_missing_product_is_not_found() {
    let store = BookingStore::open_in_memory().unwrap();
    match GraphExtractor::new(&store).extract_root(999) {
        Err(BookingsHelperError::NotFound(msg)) => assert_eq!(msg, PRODUCT_NOT_FOUND),
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[test]
fn test_extract_rejects_products_outside_booking_types() {
    let (_dir, store) = cabin_store();
    let err = GraphExtractor::new(&store).extract_root(50).unwrap_err();
    assert!(matches!(err, BookingsHelperError::NotFound(_)));
    // resources are not products
    let err = GraphExtractor::new(&store).extract_root(7).unwrap_err();
    assert!(matches!(err, BookingsHelperError::NotFound(_)));
}

#[test]
fn test_extract_requires_booking_settings() {
    let (_dir, path) = temp_db();
    with_connection(&path, |conn| {
        conn.execute_batch(
            "INSERT INTO posts(id, post_type, post_title) VALUES (60, 'product', 'Bare');
             INSERT INTO post_terms(post_id, taxonomy, term) VALUES (60, 'product_type', 'booking');
             INSERT INTO postmeta(post_id, meta_key, meta_value) VALUES (60, '_price', '5');",
        )
        .unwrap();
    });
    let store = BookingStore::open(&path).unwrap();
    let err = GraphExtractor::new(&store).extract_root(60).unwrap_err();
    assert!(matches!(err, BookingsHelperError::NotFound(_)));
}

#[test]
fn test_extract_skips_relationships_to_missing_resources() {
    let (_dir, path) = temp_db();
    with_connection(&path, |conn| {
        seed_cabin(conn);
        conn.execute_batch(
            "INSERT INTO booking_relationships(product_id, resource_id, sort_order) VALUES (42, 999, 2);",
        )
        .unwrap();
    });
    let store = BookingStore::open(&path).unwrap();
    let doc = GraphExtractor::new(&store).extract_root(42).unwrap();
    assert_eq!(doc.resources.len(), 2);
}

#[test]
fn test_extract_batch_selects_published_booking_products() {
    let (_dir, path) = temp_db();
    with_connection(&path, |conn| {
        seed_cabin(conn);
        conn.execute_batch(
            "INSERT INTO posts(id, post_type, post_status, post_title) VALUES
                 (70, 'product', 'publish', 'Lodge'),
                 (71, 'product', 'draft', 'Draft lodge');
             INSERT INTO post_terms(post_id, taxonomy, term) VALUES
                 (70, 'product_type', 'accommodation-booking'),
                 (71, 'product_type', 'accommodation-booking');
             INSERT INTO postmeta(post_id, meta_key, meta_value) VALUES
                 (70, '_wc_booking_min_duration', '2'),
                 (71, '_wc_booking_min_duration', '2');",
        )
        .unwrap();
    });
    let store = BookingStore::open(&path).unwrap();
    let extractor = GraphExtractor::new(&store);
    assert_eq!(extractor.batch_ids(&ProductType::ALL).unwrap(), vec![42, 70]);
    assert_eq!(extractor.batch_ids(&[ProductType::Booking]).unwrap(), vec![42]);

    let batch = extractor.extract_batch(&ProductType::ALL).unwrap();
    assert_eq!(batch.documents.keys().copied().collect::<Vec<_>>(), vec![42, 70]);
    assert!(batch.failures.is_empty());
    assert_eq!(
        batch.documents[&70].product.product_type().unwrap(),
        ProductType::AccommodationBooking
    );
}

#[test]
fn test_extract_batch_of_empty_store_is_none_found() {
    let store = BookingStore::open_in_memory().unwrap();
    let err = GraphExtractor::new(&store)
        .extract_batch(&ProductType::ALL)
        .unwrap_err();
    assert!(matches!(err, BookingsHelperError::NoneFound(_)));
}

#[test]
fn test_extract_keeps_booking_keys_without_leading_underscore() {
    let (_dir, path) = temp_db();
    with_connection(&path, |conn| {
        seed_cabin(conn);
        conn.execute_batch(
            "INSERT INTO postmeta(post_id, meta_key, meta_value) VALUES
                 (42, 'wc_booking_pricing', '[]'),
                 (42, '_sku', 'CAB-1');",
        )
        .unwrap();
    });
    let store = BookingStore::open(&path).unwrap();
    let doc = GraphExtractor::new(&store).extract_root(42).unwrap();
    assert_eq!(doc.product_meta_value("wc_booking_pricing"), Some("[]"));
    assert_eq!(doc.product_meta_value("_sku"), None);
}
