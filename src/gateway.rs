//! Storage gateway seam between the export/import engine and the store.
//!
//! The extractor, importer, rule synchronizer and cleanup pass only talk to a
//! [`StorageGateway`]; [`BookingStore`] is the SQLite implementation and each
//! trait method delegates to the matching store primitive.

use semver::Version;

use crate::{
    errors::BookingsHelperError,
    model::{Association, GlobalRule, MetaEntry, MetaValue, NewPost, PostType},
    store::{BookingStore, PostRow},
};

/// Option holding the installed bookings version, used to pick the rule storage shape.
pub const BOOKINGS_VERSION_OPTION: &str = "wc_bookings_version";
/// Option holding the whole rule list as one serialized blob.
pub const GLOBAL_RULES_OPTION: &str = "wc_global_booking_availability";

/// How the global availability rules are persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuleStorage {
    /// Single serialized option value (installations before 1.13.0).
    OptionBlob,
    /// Dedicated rule table.
    Table,
}

impl RuleStorage {
    pub fn for_version(raw: Option<&str>) -> Self {
        let table_since = Version::new(1, 13, 0);
        match raw.and_then(parse_loose_version) {
            Some(version) if version < table_since => RuleStorage::OptionBlob,
            _ => RuleStorage::Table,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RuleStorage::OptionBlob => "option",
            RuleStorage::Table => "table",
        }
    }
}

/// Parses `1.13`, `1.9.2` or `1.14.0-beta` style versions, padding missing parts.
fn parse_loose_version(raw: &str) -> Option<Version> {
    let raw = raw.trim();
    if let Ok(version) = Version::parse(raw) {
        return Some(version);
    }
    let core = raw.split(['-', '+']).next().unwrap_or(raw);
    let mut parts = core.split('.').map(|p| p.trim().parse::<u64>());
    let major = parts.next()?.ok()?;
    let minor = parts.next().transpose().ok()?.unwrap_or(0);
    let patch = parts.next().transpose().ok()?.unwrap_or(0);
    Some(Version::new(major, minor, patch))
}

pub trait StorageGateway {
    fn post_status(&self, id: i64) -> Result<Option<String>, BookingsHelperError>;
    fn fetch_post(&self, id: i64, post_type: PostType)
    -> Result<Option<PostRow>, BookingsHelperError>;
    fn fetch_children(
        &self,
        parent: i64,
        post_type: PostType,
    ) -> Result<Vec<PostRow>, BookingsHelperError>;
    fn find_by_terms(
        &self,
        post_type: PostType,
        status: &str,
        taxonomy: &str,
        terms: &[&str],
    ) -> Result<Vec<i64>, BookingsHelperError>;
    fn find_by_meta(
        &self,
        post_type: PostType,
        key: &str,
        values: &[&str],
    ) -> Result<Vec<i64>, BookingsHelperError>;
    fn fetch_meta(&self, post_id: i64) -> Result<Vec<MetaEntry>, BookingsHelperError>;
    fn get_meta(&self, post_id: i64, key: &str) -> Result<Option<String>, BookingsHelperError>;
    fn fetch_terms(&self, post_id: i64, taxonomy: &str) -> Result<Vec<String>, BookingsHelperError>;
    fn fetch_associations(&self, product_id: i64) -> Result<Vec<Association>, BookingsHelperError>;

    fn insert_post(&self, post: &NewPost) -> Result<i64, BookingsHelperError>;
    /// Writes the value exactly as given, without re-serialization.
    fn insert_meta_raw(&self, post_id: i64, key: &str, raw: &str)
    -> Result<i64, BookingsHelperError>;
    fn insert_meta(
        &self,
        post_id: i64,
        key: &str,
        value: &MetaValue,
    ) -> Result<i64, BookingsHelperError>;
    fn update_meta(&self, post_id: i64, key: &str, value: &MetaValue)
    -> Result<(), BookingsHelperError>;
    fn set_terms(&self, post_id: i64, taxonomy: &str, terms: &[&str])
    -> Result<(), BookingsHelperError>;
    fn insert_association(
        &self,
        product_id: i64,
        resource_id: i64,
        sort_order: i64,
    ) -> Result<i64, BookingsHelperError>;
    fn delete_association(&self, id: i64) -> Result<(), BookingsHelperError>;

    fn rule_storage(&self) -> Result<RuleStorage, BookingsHelperError>;
    fn fetch_rules(&self) -> Result<Vec<GlobalRule>, BookingsHelperError>;
    fn truncate_rules(&self) -> Result<(), BookingsHelperError>;
    fn insert_rule(&self, rule: &GlobalRule) -> Result<i64, BookingsHelperError>;
    fn get_option(&self, name: &str) -> Result<Option<String>, BookingsHelperError>;
    fn replace_option(&self, name: &str, value: &str) -> Result<(), BookingsHelperError>;

    fn begin(&self) -> Result<(), BookingsHelperError>;
    fn commit(&self) -> Result<(), BookingsHelperError>;
    fn rollback(&self) -> Result<(), BookingsHelperError>;
}

/// Runs `work` between `begin` and `commit`, rolling back when it fails.
pub fn in_transaction<G, T, F>(gateway: &G, work: F) -> Result<T, BookingsHelperError>
where
    G: StorageGateway + ?Sized,
    F: FnOnce() -> Result<T, BookingsHelperError>,
{
    gateway.begin()?;
    match work() {
        Ok(value) => match gateway.commit() {
            Ok(()) => Ok(value),
            Err(err) => {
                let _ = gateway.rollback();
                Err(err)
            }
        },
        Err(err) => {
            let _ = gateway.rollback();
            Err(err)
        }
    }
}

impl StorageGateway for BookingStore {
    fn post_status(&self, id: i64) -> Result<Option<String>, BookingsHelperError> {
        BookingStore::post_status(self, id)
    }

    fn fetch_post(
        &self,
        id: i64,
        post_type: PostType,
    ) -> Result<Option<PostRow>, BookingsHelperError> {
        self.get_post(id, post_type)
    }

    fn fetch_children(
        &self,
        parent: i64,
        post_type: PostType,
    ) -> Result<Vec<PostRow>, BookingsHelperError> {
        self.children(parent, post_type)
    }

    fn find_by_terms(
        &self,
        post_type: PostType,
        status: &str,
        taxonomy: &str,
        terms: &[&str],
    ) -> Result<Vec<i64>, BookingsHelperError> {
        self.posts_with_terms(post_type, status, taxonomy, terms)
    }

    fn find_by_meta(
        &self,
        post_type: PostType,
        key: &str,
        values: &[&str],
    ) -> Result<Vec<i64>, BookingsHelperError> {
        self.posts_with_meta(post_type, key, values)
    }

    fn fetch_meta(&self, post_id: i64) -> Result<Vec<MetaEntry>, BookingsHelperError> {
        self.post_meta(post_id)
    }

    fn get_meta(&self, post_id: i64, key: &str) -> Result<Option<String>, BookingsHelperError> {
        BookingStore::get_meta(self, post_id, key)
    }

    fn fetch_terms(&self, post_id: i64, taxonomy: &str) -> Result<Vec<String>, BookingsHelperError> {
        self.terms(post_id, taxonomy)
    }

    fn fetch_associations(&self, product_id: i64) -> Result<Vec<Association>, BookingsHelperError> {
        self.associations(product_id)
    }

    fn insert_post(&self, post: &NewPost) -> Result<i64, BookingsHelperError> {
        BookingStore::insert_post(self, post)
    }

    fn insert_meta_raw(
        &self,
        post_id: i64,
        key: &str,
        raw: &str,
    ) -> Result<i64, BookingsHelperError> {
        self.add_meta_raw(post_id, key, raw)
    }

    fn insert_meta(
        &self,
        post_id: i64,
        key: &str,
        value: &MetaValue,
    ) -> Result<i64, BookingsHelperError> {
        self.add_meta(post_id, key, value)
    }

    fn update_meta(
        &self,
        post_id: i64,
        key: &str,
        value: &MetaValue,
    ) -> Result<(), BookingsHelperError> {
        BookingStore::update_meta(self, post_id, key, value)
    }

    fn set_terms(
        &self,
        post_id: i64,
        taxonomy: &str,
        terms: &[&str],
    ) -> Result<(), BookingsHelperError> {
        BookingStore::set_terms(self, post_id, taxonomy, terms)
    }

    fn insert_association(
        &self,
        product_id: i64,
        resource_id: i64,
        sort_order: i64,
    ) -> Result<i64, BookingsHelperError> {
        BookingStore::insert_association(self, product_id, resource_id, sort_order)
    }

    fn delete_association(&self, id: i64) -> Result<(), BookingsHelperError> {
        BookingStore::delete_association(self, id)
    }

    fn rule_storage(&self) -> Result<RuleStorage, BookingsHelperError> {
        let version = BookingStore::get_option(self, BOOKINGS_VERSION_OPTION)?;
        Ok(RuleStorage::for_version(version.as_deref()))
    }

    fn fetch_rules(&self) -> Result<Vec<GlobalRule>, BookingsHelperError> {
        self.rules()
    }

    fn truncate_rules(&self) -> Result<(), BookingsHelperError> {
        BookingStore::truncate_rules(self)
    }

    fn insert_rule(&self, rule: &GlobalRule) -> Result<i64, BookingsHelperError> {
        BookingStore::insert_rule(self, rule)
    }

    fn get_option(&self, name: &str) -> Result<Option<String>, BookingsHelperError> {
        BookingStore::get_option(self, name)
    }

    fn replace_option(&self, name: &str, value: &str) -> Result<(), BookingsHelperError> {
        self.delete_option(name)?;
        self.set_option(name, value)
    }

    fn begin(&self) -> Result<(), BookingsHelperError> {
        BookingStore::begin(self)
    }

    fn commit(&self) -> Result<(), BookingsHelperError> {
        BookingStore::commit(self)
    }

    fn rollback(&self) -> Result<(), BookingsHelperError> {
        BookingStore::rollback(self)
    }
}
