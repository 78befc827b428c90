mod common;

use std::cell::Cell;

use bookings_helper::{
    BookingStore, BookingsHelperError, GraphExtractor, GraphImporter, ImportOptions, MetaEntry,
    MetaValue, StorageGateway,
    codec,
    extract::{PRODUCT_META, RESOURCE_META},
    gateway::RuleStorage,
    import::MISSING_RULES,
    model::{
        Association, CostDictionary, GlobalRule, NewPost, PRODUCT_TYPE_TAXONOMY, PostType,
        RESOURCE_BASE_COSTS, RESOURCE_BLOCK_COSTS,
    },
    store::PostRow,
};
use common::{AVAILABILITY, cabin_store, rule};
use serde_json::json;

fn without_costs(meta: Vec<MetaEntry>) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = meta
        .into_iter()
        .filter(|m| m.meta_key != RESOURCE_BASE_COSTS && m.meta_key != RESOURCE_BLOCK_COSTS)
        .map(|m| (m.meta_key, m.meta_value))
        .collect();
    pairs.sort();
    pairs
}

#[test]
fn test_cabin_round_trip_creates_fresh_aggregate() {
    let (_dir, store) = cabin_store();
    let doc = GraphExtractor::new(&store).extract_root(42).unwrap();
    let bytes = codec::encode_document(&doc).unwrap();

    let report = GraphImporter::new(&store).import_document(&bytes).unwrap();
    assert_eq!(report.products.len(), 1);
    let imported = &report.products[0];
    assert_eq!(imported.source_id, 42);
    assert_ne!(imported.new_id, 42);
    assert_eq!(imported.resources_created, 2);
    assert_eq!(imported.persons_created, 1);
    assert_eq!(report.resources_created(), 2);
    assert_eq!(report.persons_created(), 1);

    let new_id = imported.new_id;
    let product = store.get_post(new_id, PostType::Product).unwrap().unwrap();
    assert_eq!(product.title, "Cabin (bookings test #42)");
    assert_eq!(product.content, "Lakeside cabin");
    assert_eq!(
        store.terms(new_id, PRODUCT_TYPE_TAXONOMY).unwrap(),
        vec!["booking".to_string()]
    );

    let original = PRODUCT_META.apply(store.post_meta(42).unwrap());
    assert_eq!(
        without_costs(store.post_meta(new_id).unwrap()),
        without_costs(original)
    );
}

#[test]
fn test_import_remaps_resources_and_cost_dictionaries() {
    let (_dir, store) = cabin_store();
    let doc = GraphExtractor::new(&store).extract_root(42).unwrap();
    let report = GraphImporter::new(&store)
        .import_document(&codec::encode_document(&doc).unwrap())
        .unwrap();
    let new_id = report.new_root_id().unwrap();

    let associations: Vec<Association> = store.associations(new_id).unwrap();
    assert_eq!(associations.len(), 2);
    let canoe = associations[0].resource_id;
    let sauna = associations[1].resource_id;
    assert_eq!(associations[0].sort_order, 0);
    assert_eq!(associations[1].sort_order, 1);
    assert!(![7, 9].contains(&canoe) && ![7, 9].contains(&sauna));

    let canoe_row: PostRow = store.get_post(canoe, PostType::Resource).unwrap().unwrap();
    assert_eq!(canoe_row.title, "Canoe (resource test #7)");
    assert_eq!(
        RESOURCE_META.apply(store.post_meta(canoe).unwrap()),
        RESOURCE_META.apply(store.post_meta(7).unwrap())
    );
    assert_eq!(
        store.get_meta(canoe, "_wc_booking_availability").unwrap().as_deref(),
        Some(AVAILABILITY)
    );

    let base = CostDictionary::parse(&store.get_meta(new_id, RESOURCE_BASE_COSTS).unwrap().unwrap());
    let block =
        CostDictionary::parse(&store.get_meta(new_id, RESOURCE_BLOCK_COSTS).unwrap().unwrap());
    assert_eq!(base.len(), 2);
    assert_eq!(base.cost_or_empty(canoe), json!("15"));
    assert_eq!(base.cost_or_empty(sauna), json!("20"));
    assert_eq!(block.len(), 2);
    assert_eq!(block.cost_or_empty(canoe), json!("5"));
    assert_eq!(block.get(sauna), Some(&json!("")));
    assert!(base.get(7).is_none());

    let cost_rows = store
        .post_meta(new_id)
        .unwrap()
        .into_iter()
        .filter(|m| m.meta_key == RESOURCE_BASE_COSTS)
        .count();
    assert_eq!(cost_rows, 1);
}

#[test]
fn test_import_recreates_persons_under_new_product() {
    let (_dir, store) = cabin_store();
    let doc = GraphExtractor::new(&store).extract_root(42).unwrap();
    let new_id = GraphImporter::new(&store)
        .import_document(&codec::encode_document(&doc).unwrap())
        .unwrap()
        .new_root_id()
        .unwrap();

    let persons = store.children(new_id, PostType::Person).unwrap();
    assert_eq!(persons.len(), 1);
    assert_eq!(persons[0].title, "Adult (person test #11)");
    assert_eq!(persons[0].excerpt, "Ages 18 and up");
    assert_eq!(persons[0].parent, new_id);
    assert_eq!(
        store.post_meta(persons[0].id).unwrap(),
        store.post_meta(11).unwrap()
    );
    // the source aggregate is untouched
    assert_eq!(store.children(42, PostType::Person).unwrap().len(), 1);
}

#[test]
fn test_reimport_creates_independent_copies() {
    let (_dir, store) = cabin_store();
    let doc = GraphExtractor::new(&store).extract_root(42).unwrap();
    let bytes = codec::encode_document(&doc).unwrap();
    let importer = GraphImporter::new(&store);
    let first = importer.import_document(&bytes).unwrap().new_root_id().unwrap();
    let second = importer.import_document(&bytes).unwrap().new_root_id().unwrap();
    assert_ne!(first, second);
    assert_eq!(store.counts().unwrap().products, 4);
}

#[test]
fn test_import_accepts_legacy_string_document() {
    let store = BookingStore::open_in_memory().unwrap();
    let legacy = br#"{
        "product": {"ID": "42", "post_title": "Cabin", "post_content": "", "type": "accommodation-booking"},
        "product_meta": [
            {"meta_id": "3", "post_id": "42", "meta_key": "_wc_booking_duration", "meta_value": "2"},
            {"meta_id": "4", "post_id": "42", "meta_key": "_resource_base_costs", "meta_value": "{\"7\":\"15\"}"}
        ],
        "resources": [
            {"resource": {"ID": "7", "post_title": "Canoe"}, "resource_meta": [{"meta_key": "qty", "meta_value": "3"}]}
        ],
        "persons": []
    }"#;
    let report = GraphImporter::new(&store).import_document(legacy).unwrap();
    let new_id = report.new_root_id().unwrap();
    assert_eq!(
        store.terms(new_id, PRODUCT_TYPE_TAXONOMY).unwrap(),
        vec!["accommodation-booking".to_string()]
    );
    let canoe = store.associations(new_id).unwrap()[0].resource_id;
    let base = CostDictionary::parse(&store.get_meta(new_id, RESOURCE_BASE_COSTS).unwrap().unwrap());
    assert_eq!(base.cost_or_empty(canoe), json!("15"));
    // no block dictionary in the source, still rebuilt with an empty entry
    let block =
        CostDictionary::parse(&store.get_meta(new_id, RESOURCE_BLOCK_COSTS).unwrap().unwrap());
    assert_eq!(block.cost_or_empty(canoe), json!(""));
}

#[test]
fn test_import_remaps_php_serialized_cost_dictionaries() {
    let store = BookingStore::open_in_memory().unwrap();
    let legacy = json!({
        "product": {"ID": "42", "post_title": "Cabin", "type": "booking"},
        "product_meta": [
            {"meta_key": "_resource_base_costs", "meta_value": "a:2:{i:7;s:2:\"15\";i:9;s:2:\"20\";}"},
            {"meta_key": "_resource_block_costs", "meta_value": "a:1:{i:7;s:1:\"5\";}"}
        ],
        "resources": [
            {"resource": {"ID": "7", "post_title": "Canoe"}, "resource_meta": []},
            {"resource": {"ID": "9", "post_title": "Sauna"}, "resource_meta": []}
        ],
        "persons": []
    })
    .to_string();
    let new_id = GraphImporter::new(&store)
        .import_document(legacy.as_bytes())
        .unwrap()
        .new_root_id()
        .unwrap();

    let associations = store.associations(new_id).unwrap();
    let (canoe, sauna) = (associations[0].resource_id, associations[1].resource_id);
    let base = CostDictionary::parse(&store.get_meta(new_id, RESOURCE_BASE_COSTS).unwrap().unwrap());
    assert_eq!(base.len(), 2);
    assert_eq!(base.cost_or_empty(canoe), json!("15"));
    assert_eq!(base.cost_or_empty(sauna), json!("20"));
    let block =
        CostDictionary::parse(&store.get_meta(new_id, RESOURCE_BLOCK_COSTS).unwrap().unwrap());
    assert_eq!(block.cost_or_empty(canoe), json!("5"));
    assert_eq!(block.cost_or_empty(sauna), json!(""));
}

#[test]
fn test_import_defaults_missing_type_to_booking() {
    let store = BookingStore::open_in_memory().unwrap();
    let report = GraphImporter::new(&store)
        .import_document(br#"{"product": {"ID": 5, "post_title": "Tent"}}"#)
        .unwrap();
    let new_id = report.new_root_id().unwrap();
    assert_eq!(
        store.terms(new_id, PRODUCT_TYPE_TAXONOMY).unwrap(),
        vec!["booking".to_string()]
    );
    assert_eq!(report.resources_created(), 0);
    assert!(store.get_meta(new_id, RESOURCE_BASE_COSTS).unwrap().is_none());
}

#[test]
fn test_import_id_keyed_batch() {
    let store = BookingStore::open_in_memory().unwrap();
    let batch = br#"{
        "42": {"product": {"ID": "42", "post_title": "Cabin"}, "product_meta": [], "resources": [], "persons": []},
        "43": {"product": {"ID": "43", "post_title": "Lodge"}, "product_meta": [], "resources": [], "persons": []}
    }"#;
    let report = GraphImporter::new(&store).import_document(batch).unwrap();
    let sources: Vec<i64> = report.products.iter().map(|p| p.source_id).collect();
    assert_eq!(sources, vec![42, 43]);
    assert_eq!(report.rules_imported, None);
}

#[test]
fn test_import_embedded_rules_when_requested() {
    let store = BookingStore::open_in_memory().unwrap();
    let envelope = json!({
        "booking-products": {"42": {"product": {"ID": 42, "post_title": "Cabin"}}},
        "global-availability-rules": [rule("Christmas", 0), rule("New year", 1)]
    })
    .to_string();

    let options = ImportOptions {
        with_rules: true,
        ..ImportOptions::default()
    };
    let report = GraphImporter::with_options(&store, options)
        .import_document(envelope.as_bytes())
        .unwrap();
    assert_eq!(report.products.len(), 1);
    assert_eq!(report.rules_imported, Some(2));
    assert_eq!(store.rules().unwrap().len(), 2);

    // without the flag the embedded rules are left alone
    let report = GraphImporter::new(&store)
        .import_document(envelope.as_bytes())
        .unwrap();
    assert_eq!(report.rules_imported, None);
}

#[test]
fn test_missing_rule_payload_is_a_warning() {
    let store = BookingStore::open_in_memory().unwrap();
    let options = ImportOptions {
        with_rules: true,
        ..ImportOptions::default()
    };
    let report = GraphImporter::with_options(&store, options)
        .import_document(br#"{"booking-products": {"1": {"product": {"ID": 1}}}}"#)
        .unwrap();
    assert_eq!(report.products.len(), 1);
    assert_eq!(report.warnings, vec![MISSING_RULES.to_string()]);
}

#[test]
fn test_empty_embedded_rules_keep_stored_rules() {
    let store = BookingStore::open_in_memory().unwrap();
    store.insert_rule(&rule("Christmas", 0)).unwrap();
    store.insert_rule(&rule("New year", 1)).unwrap();
    let options = ImportOptions {
        with_rules: true,
        ..ImportOptions::default()
    };
    let importer = GraphImporter::with_options(&store, options);

    for envelope in [
        r#"{"booking-products": {"1": {"product": {"ID": 1}}}, "global-availability-rules": []}"#,
        r#"{"booking-products": {"1": {"product": {"ID": 1}}}, "global-availability-rules": {}}"#,
        r#"{"product": {"ID": 1}, "global_rules": "[]"}"#,
    ] {
        let report = importer.import_document(envelope.as_bytes()).unwrap();
        assert_eq!(report.products.len(), 1);
        assert_eq!(report.rules_imported, None);
        assert_eq!(report.warnings, vec![MISSING_RULES.to_string()]);
        assert_eq!(store.rules().unwrap().len(), 2);
    }
}

#[test]
fn test_batch_failure_names_products_already_imported() {
    let store = BookingStore::open_in_memory().unwrap();
    let batch = br#"{"booking-products": {
        "1": {"product": {"ID": 1, "post_title": "Cabin"}},
        "2": {"product": {"ID": 2, "post_title": "Shirt", "type": "simple"}}
    }}"#;
    let err = GraphImporter::new(&store).import_document(batch).unwrap_err();
    assert!(matches!(err, BookingsHelperError::MalformedDocument(_)));
    assert!(err.message().contains("Already imported before the failure: #1 -> #"));
    assert_eq!(store.counts().unwrap().products, 1);

    // a failure on the first product has nothing to report
    let err = GraphImporter::new(&store)
        .import_document(br#"{"booking-products": {"2": {"product": {"ID": 2, "type": "simple"}}}}"#)
        .unwrap_err();
    assert!(!err.message().contains("Already imported"));
}

#[test]
fn test_import_rejects_bad_input() {
    let store = BookingStore::open_in_memory().unwrap();
    let importer = GraphImporter::new(&store);
    assert!(matches!(
        importer.import_document(b"<xml/>"),
        Err(BookingsHelperError::MalformedDocument(_))
    ));
    assert!(matches!(
        importer.import_document(br#"{"resources": []}"#),
        Err(BookingsHelperError::MalformedDocument(_))
    ));
    assert!(matches!(
        importer.import_document(br#"{"product": {"ID": 1, "type": "simple"}}"#),
        Err(BookingsHelperError::MalformedDocument(_))
    ));

    let small = GraphImporter::with_options(
        &store,
        ImportOptions {
            max_document_bytes: 8,
            ..ImportOptions::default()
        },
    );
    assert!(matches!(
        small.import_document(br#"{"product": {"ID": 1}}"#),
        Err(BookingsHelperError::SizeExceeded(_))
    ));
    assert_eq!(store.counts().unwrap().products, 0);
}

/// Delegates to a store but refuses to create persons.
struct PersonlessGateway {
    store: BookingStore,
    refused: Cell<usize>,
}

impl StorageGateway for PersonlessGateway {
    fn post_status(&self, id: i64) -> Result<Option<String>, BookingsHelperError> {
        StorageGateway::post_status(&self.store, id)
    }
    fn fetch_post(&self, id: i64, post_type: PostType) -> Result<Option<PostRow>, BookingsHelperError> {
        self.store.fetch_post(id, post_type)
    }
    fn fetch_children(&self, parent: i64, post_type: PostType) -> Result<Vec<PostRow>, BookingsHelperError> {
        self.store.fetch_children(parent, post_type)
    }
    fn find_by_terms(
        &self,
        post_type: PostType,
        status: &str,
        taxonomy: &str,
        terms: &[&str],
    ) -> Result<Vec<i64>, BookingsHelperError> {
        self.store.find_by_terms(post_type, status, taxonomy, terms)
    }
    fn find_by_meta(&self, post_type: PostType, key: &str, values: &[&str]) -> Result<Vec<i64>, BookingsHelperError> {
        self.store.find_by_meta(post_type, key, values)
    }
    fn fetch_meta(&self, post_id: i64) -> Result<Vec<MetaEntry>, BookingsHelperError> {
        self.store.fetch_meta(post_id)
    }
    fn get_meta(&self, post_id: i64, key: &str) -> Result<Option<String>, BookingsHelperError> {
        StorageGateway::get_meta(&self.store, post_id, key)
    }
    fn fetch_terms(&self, post_id: i64, taxonomy: &str) -> Result<Vec<String>, BookingsHelperError> {
        self.store.fetch_terms(post_id, taxonomy)
    }
    fn fetch_associations(&self, product_id: i64) -> Result<Vec<Association>, BookingsHelperError> {
        self.store.fetch_associations(product_id)
    }
    fn insert_post(&self, post: &NewPost) -> Result<i64, BookingsHelperError> {
        if post.post_type == PostType::Person {
            self.refused.set(self.refused.get() + 1);
            return Err(BookingsHelperError::query("disk full"));
        }
        StorageGateway::insert_post(&self.store, post)
    }
    fn insert_meta_raw(&self, post_id: i64, key: &str, raw: &str) -> Result<i64, BookingsHelperError> {
        self.store.insert_meta_raw(post_id, key, raw)
    }
    fn insert_meta(&self, post_id: i64, key: &str, value: &MetaValue) -> Result<i64, BookingsHelperError> {
        self.store.insert_meta(post_id, key, value)
    }
    fn update_meta(&self, post_id: i64, key: &str, value: &MetaValue) -> Result<(), BookingsHelperError> {
        StorageGateway::update_meta(&self.store, post_id, key, value)
    }
    fn set_terms(&self, post_id: i64, taxonomy: &str, terms: &[&str]) -> Result<(), BookingsHelperError> {
        StorageGateway::set_terms(&self.store, post_id, taxonomy, terms)
    }
    fn insert_association(
        &self,
        product_id: i64,
        resource_id: i64,
        sort_order: i64,
    ) -> Result<i64, BookingsHelperError> {
        StorageGateway::insert_association(&self.store, product_id, resource_id, sort_order)
    }
    fn delete_association(&self, id: i64) -> Result<(), BookingsHelperError> {
        StorageGateway::delete_association(&self.store, id)
    }
    fn rule_storage(&self) -> Result<RuleStorage, BookingsHelperError> {
        self.store.rule_storage()
    }
    fn fetch_rules(&self) -> Result<Vec<GlobalRule>, BookingsHelperError> {
        self.store.fetch_rules()
    }
    fn truncate_rules(&self) -> Result<(), BookingsHelperError> {
        StorageGateway::truncate_rules(&self.store)
    }
    fn insert_rule(&self, rule: &GlobalRule) -> Result<i64, BookingsHelperError> {
        StorageGateway::insert_rule(&self.store, rule)
    }
    fn get_option(&self, name: &str) -> Result<Option<String>, BookingsHelperError> {
        StorageGateway::get_option(&self.store, name)
    }
    fn replace_option(&self, name: &str, value: &str) -> Result<(), BookingsHelperError> {
        self.store.replace_option(name, value)
    }
    fn begin(&self) -> Result<(), BookingsHelperError> {
        StorageGateway::begin(&self.store)
    }
    fn commit(&self) -> Result<(), BookingsHelperError> {
        StorageGateway::commit(&self.store)
    }
    fn rollback(&self) -> Result<(), BookingsHelperError> {
        StorageGateway::rollback(&self.store)
    }
}

fn cabin_bytes() -> (tempfile::TempDir, PersonlessGateway, Vec<u8>) {
    let (dir, store) = cabin_store();
    let doc = GraphExtractor::new(&store).extract_root(42).unwrap();
    let bytes = codec::encode_document(&doc).unwrap();
    (
        dir,
        PersonlessGateway {
            store,
            refused: Cell::new(0),
        },
        bytes,
    )
}

#[test]
fn test_failed_aggregate_is_rolled_back_when_atomic() {
    let (_dir, gateway, bytes) = cabin_bytes();
    let before = gateway.store.counts().unwrap();

    let err = GraphImporter::new(&gateway).import_document(&bytes).unwrap_err();
    assert!(matches!(err, BookingsHelperError::CreateFailed(_)));
    assert_eq!(gateway.refused.get(), 1);
    assert_eq!(gateway.store.counts().unwrap(), before);
}

#[test]
fn test_failed_aggregate_leaves_rows_without_atomic_import() {
    let (_dir, gateway, bytes) = cabin_bytes();
    let before = gateway.store.counts().unwrap();

    let options = ImportOptions {
        atomic: false,
        ..ImportOptions::default()
    };
    let err = GraphImporter::with_options(&gateway, options)
        .import_document(&bytes)
        .unwrap_err();
    assert!(matches!(err, BookingsHelperError::CreateFailed(_)));

    let after = gateway.store.counts().unwrap();
    assert_eq!(after.products, before.products + 1);
    assert_eq!(after.resources, before.resources + 2);
    assert_eq!(after.persons, before.persons);
}
