//! Graph extractor: walks one booking product aggregate out of the store.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::{
    document::ExportDocument,
    errors::BookingsHelperError,
    gateway::StorageGateway,
    model::{
        MetaEntry, PRODUCT_TYPE_TAXONOMY, PUBLISHED, Person, PostType, Product, ProductType,
        Resource,
    },
    store::PostRow,
};

pub const PRODUCT_NOT_FOUND: &str = "This booking product does not exist!";

/// Allow-list for metadata keys: any key containing one of `fragments`, or
/// equal to one of `exact`.
#[derive(Clone, Copy, Debug)]
pub struct MetaFilter {
    pub fragments: &'static [&'static str],
    pub exact: &'static [&'static str],
}

impl MetaFilter {
    pub fn matches(&self, key: &str) -> bool {
        self.fragments.iter().any(|fragment| key.contains(fragment))
            || self.exact.iter().any(|exact| *exact == key)
    }

    pub fn apply(&self, meta: Vec<MetaEntry>) -> Vec<MetaEntry> {
        meta.into_iter()
            .filter(|entry| self.matches(&entry.meta_key))
            .collect()
    }
}

/// Booking settings of the product itself.
pub const PRODUCT_META: MetaFilter = MetaFilter {
    fragments: &["wc_booking"],
    exact: &[
        "_resource_base_costs",
        "_resource_block_costs",
        "_wc_display_cost",
        "_virtual",
    ],
};

/// Quantity and availability of a resource.
pub const RESOURCE_META: MetaFilter = MetaFilter {
    fragments: &[],
    exact: &["qty", "_wc_booking_availability"],
};

/// Outcome of a category batch: documents that were extracted plus the ids
/// that failed, each with its error.
#[derive(Debug, Default)]
pub struct BatchExtraction {
    pub documents: BTreeMap<i64, ExportDocument>,
    pub failures: Vec<(i64, BookingsHelperError)>,
}

pub struct GraphExtractor<'a, G: StorageGateway + ?Sized> {
    gateway: &'a G,
}

impl<'a, G: StorageGateway + ?Sized> GraphExtractor<'a, G> {
    pub fn new(gateway: &'a G) -> Self {
        Self { gateway }
    }

    pub fn extract_root(&self, id: i64) -> Result<ExportDocument, BookingsHelperError> {
        if self.gateway.post_status(id)?.is_none() {
            return Err(BookingsHelperError::not_found(PRODUCT_NOT_FOUND));
        }
        let product = self.product(id)?;
        let product_meta = PRODUCT_META.apply(self.gateway.fetch_meta(id)?);
        if product_meta.is_empty() {
            return Err(BookingsHelperError::not_found(PRODUCT_NOT_FOUND));
        }

        let mut doc = ExportDocument::new(&product, product_meta);
        for association in self.gateway.fetch_associations(id)? {
            let Some(row) = self
                .gateway
                .fetch_post(association.resource_id, PostType::Resource)?
            else {
                warn!(
                    product = id,
                    resource = association.resource_id,
                    "skipping relationship to a missing resource"
                );
                continue;
            };
            let meta = RESOURCE_META.apply(self.gateway.fetch_meta(row.id)?);
            doc.push_resource(&resource_from_row(row), meta);
        }
        for row in self.gateway.fetch_children(id, PostType::Person)? {
            let meta = self.gateway.fetch_meta(row.id)?;
            doc.push_person(&person_from_row(row), meta);
        }

        debug!(
            product = id,
            resources = doc.resources.len(),
            persons = doc.persons.len(),
            "extracted booking product"
        );
        Ok(doc)
    }

    /// Published products tagged with any of `categories`, ascending by id.
    pub fn batch_ids(&self, categories: &[ProductType]) -> Result<Vec<i64>, BookingsHelperError> {
        let terms: Vec<&str> = categories.iter().map(|c| c.as_str()).collect();
        self.gateway
            .find_by_terms(PostType::Product, PUBLISHED, PRODUCT_TYPE_TAXONOMY, &terms)
    }

    pub fn extract_batch(
        &self,
        categories: &[ProductType],
    ) -> Result<BatchExtraction, BookingsHelperError> {
        let ids = self.batch_ids(categories)?;
        if ids.is_empty() {
            return Err(BookingsHelperError::none_found(
                "There are no booking products to export.",
            ));
        }
        let mut batch = BatchExtraction::default();
        for id in ids {
            match self.extract_root(id) {
                Ok(doc) => {
                    batch.documents.insert(id, doc);
                }
                Err(err) => {
                    warn!(product = id, error = %err, "booking product skipped");
                    batch.failures.push((id, err));
                }
            }
        }
        info!(
            exported = batch.documents.len(),
            failed = batch.failures.len(),
            "extracted booking products"
        );
        Ok(batch)
    }

    fn product(&self, id: i64) -> Result<Product, BookingsHelperError> {
        let row = self
            .gateway
            .fetch_post(id, PostType::Product)?
            .ok_or_else(|| BookingsHelperError::not_found(PRODUCT_NOT_FOUND))?;
        let product_type = self
            .gateway
            .fetch_terms(id, PRODUCT_TYPE_TAXONOMY)?
            .iter()
            .find_map(|term| term.parse::<ProductType>().ok())
            .ok_or_else(|| BookingsHelperError::not_found(PRODUCT_NOT_FOUND))?;
        Ok(Product {
            id: row.id,
            title: row.title,
            content: row.content,
            status: row.status,
            product_type,
        })
    }
}

fn resource_from_row(row: PostRow) -> Resource {
    Resource {
        id: row.id,
        title: row.title,
        status: row.status,
    }
}

fn person_from_row(row: PostRow) -> Person {
    Person {
        id: row.id,
        title: row.title,
        excerpt: row.excerpt,
        parent: row.parent,
    }
}
