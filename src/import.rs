//! Graph importer: recreates exported aggregates under fresh identities.
//!
//! Every id found in a document is a correlation key only. Posts are always
//! inserted new, relationships point at the new resource ids and the two cost
//! dictionaries on the product are rebuilt keyed by the new resource ids.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::{
    codec::{self, DocumentShape},
    document::ExportDocument,
    errors::BookingsHelperError,
    gateway::{StorageGateway, in_transaction},
    model::{
        CostDictionary, MetaValue, NewPost, PRODUCT_TYPE_TAXONOMY, PostType, RESOURCE_BASE_COSTS,
        RESOURCE_BLOCK_COSTS,
    },
    rules::RuleSynchronizer,
};

pub const DEFAULT_MAX_DOCUMENT_BYTES: u64 = 1_000_000;
pub const SIZE_EXCEEDED: &str = "The file exceeds 1MB.";
pub const MISSING_RULES: &str = "No global availability rules were found in the file.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImportOptions {
    /// Write each aggregate inside one transaction.
    pub atomic: bool,
    /// Import a rule payload carried next to the products.
    pub with_rules: bool,
    pub max_document_bytes: u64,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            atomic: true,
            with_rules: false,
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ImportedProduct {
    pub source_id: i64,
    pub new_id: i64,
    pub resources_created: usize,
    pub persons_created: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub products: Vec<ImportedProduct>,
    pub rules_imported: Option<usize>,
    pub warnings: Vec<String>,
}

impl ImportReport {
    pub fn resources_created(&self) -> usize {
        self.products.iter().map(|p| p.resources_created).sum()
    }

    pub fn persons_created(&self) -> usize {
        self.products.iter().map(|p| p.persons_created).sum()
    }

    /// New id of the first imported product.
    pub fn new_root_id(&self) -> Option<i64> {
        self.products.first().map(|p| p.new_id)
    }

    pub fn merge(&mut self, other: ImportReport) {
        self.products.extend(other.products);
        if let Some(count) = other.rules_imported {
            *self.rules_imported.get_or_insert(0) += count;
        }
        self.warnings.extend(other.warnings);
    }
}

pub struct GraphImporter<'a, G: StorageGateway + ?Sized> {
    gateway: &'a G,
    options: ImportOptions,
}

impl<'a, G: StorageGateway + ?Sized> GraphImporter<'a, G> {
    pub fn new(gateway: &'a G) -> Self {
        Self::with_options(gateway, ImportOptions::default())
    }

    pub fn with_options(gateway: &'a G, options: ImportOptions) -> Self {
        Self { gateway, options }
    }

    pub fn options(&self) -> ImportOptions {
        self.options
    }

    /// Decodes `bytes` and imports every aggregate it holds.
    pub fn import_document(&self, bytes: &[u8]) -> Result<ImportReport, BookingsHelperError> {
        check_size(bytes.len(), self.options.max_document_bytes)?;
        let map = codec::decode(bytes)?;
        self.import_map(map, true)
    }

    fn import_map(
        &self,
        map: Map<String, Value>,
        top_level: bool,
    ) -> Result<ImportReport, BookingsHelperError> {
        let shape = codec::detect_shape(&map)?;
        let embedded_rules = if top_level && self.options.with_rules {
            Some(codec::embedded_rules(&map)?)
        } else {
            None
        };

        let mut report = ImportReport::default();
        match shape {
            DocumentShape::Product => {
                let doc = codec::document_from_map(map)?;
                report.products.push(self.import_aggregate(&doc)?);
            }
            DocumentShape::Batch | DocumentShape::IdKeyedBatch => {
                for (key, value) in codec::batch_entries(map, shape)? {
                    let Value::Object(entry) = value else {
                        return Err(BookingsHelperError::malformed(format!(
                            "batch entry {key} is not a product document"
                        )));
                    };
                    match self.import_map(entry, false) {
                        Ok(imported) => report.merge(imported),
                        Err(err) => return Err(self.partial_failure(err, &report)),
                    }
                }
            }
        }

        match embedded_rules {
            Some(Some(rules)) => {
                let written = RuleSynchronizer::new(self.gateway)
                    .atomic(self.options.atomic)
                    .import_rules(&rules)?;
                report.rules_imported = Some(written);
            }
            Some(None) => {
                warn!("rule import requested but the document carries no rules");
                report.warnings.push(MISSING_RULES.to_string());
            }
            None => {}
        }
        Ok(report)
    }

    /// Names the aggregates committed before `err` stopped a batch.
    fn partial_failure(
        &self,
        err: BookingsHelperError,
        report: &ImportReport,
    ) -> BookingsHelperError {
        if report.products.is_empty() {
            return err;
        }
        let done: Vec<String> = report
            .products
            .iter()
            .map(|p| format!("#{} -> #{}", p.source_id, p.new_id))
            .collect();
        warn!(imported = done.len(), "batch import stopped after partial progress");
        let mut note = format!("Already imported before the failure: {}.", done.join(", "));
        if !self.options.atomic {
            note.push_str(" The failing product may be partially written.");
        }
        err.annotate(&note)
    }

    /// Writes one aggregate, inside a transaction when the importer is atomic.
    pub fn import_aggregate(
        &self,
        doc: &ExportDocument,
    ) -> Result<ImportedProduct, BookingsHelperError> {
        let imported = if self.options.atomic {
            in_transaction(self.gateway, || self.write_aggregate(doc))?
        } else {
            self.write_aggregate(doc)?
        };
        info!(
            source = imported.source_id,
            product = imported.new_id,
            resources = imported.resources_created,
            persons = imported.persons_created,
            "imported booking product"
        );
        Ok(imported)
    }

    fn write_aggregate(
        &self,
        doc: &ExportDocument,
    ) -> Result<ImportedProduct, BookingsHelperError> {
        let source_id = doc.source_id();
        let product_type = doc.product.product_type()?;

        let mut product = NewPost::published(
            PostType::Product,
            format!("{} (bookings test #{source_id})", doc.product.post_title),
        );
        product.content = doc.product.post_content.clone();
        let new_id = self.create(&product)?;

        for entry in &doc.product_meta {
            if MetaValue::is_serialized(&entry.meta_value) {
                self.gateway
                    .insert_meta_raw(new_id, &entry.meta_key, &entry.meta_value)?;
            } else {
                self.gateway.insert_meta(
                    new_id,
                    &entry.meta_key,
                    &MetaValue::Text(entry.meta_value.clone()),
                )?;
            }
        }
        self.gateway
            .set_terms(new_id, PRODUCT_TYPE_TAXONOMY, &[product_type.as_str()])?;

        let old_base = doc.product_meta_value(RESOURCE_BASE_COSTS);
        let old_block = doc.product_meta_value(RESOURCE_BLOCK_COSTS);
        let old_base_costs = old_cost_dictionary(source_id, RESOURCE_BASE_COSTS, old_base);
        let old_block_costs = old_cost_dictionary(source_id, RESOURCE_BLOCK_COSTS, old_block);
        let mut base_costs = CostDictionary::default();
        let mut block_costs = CostDictionary::default();

        for (position, entry) in doc.resources.iter().enumerate() {
            let old_resource = entry.resource.id;
            let resource = NewPost::published(
                PostType::Resource,
                format!("{} (resource test #{old_resource})", entry.resource.post_title),
            );
            let new_resource = self.create(&resource)?;
            for meta in &entry.resource_meta {
                self.gateway.insert_meta(
                    new_resource,
                    &meta.meta_key,
                    &MetaValue::probe(&meta.meta_value),
                )?;
            }
            base_costs.insert(new_resource, old_base_costs.cost_or_empty(old_resource));
            block_costs.insert(new_resource, old_block_costs.cost_or_empty(old_resource));
            self.gateway
                .insert_association(new_id, new_resource, position as i64)?;
            debug!(
                product = new_id,
                source = old_resource,
                resource = new_resource,
                "created resource"
            );
        }
        if !doc.resources.is_empty() || old_base.is_some() {
            self.gateway
                .update_meta(new_id, RESOURCE_BASE_COSTS, &base_costs.to_meta_value())?;
        }
        if !doc.resources.is_empty() || old_block.is_some() {
            self.gateway
                .update_meta(new_id, RESOURCE_BLOCK_COSTS, &block_costs.to_meta_value())?;
        }

        for entry in &doc.persons {
            let mut person = NewPost::published(
                PostType::Person,
                format!("{} (person test #{})", entry.person.post_title, entry.person.id),
            );
            person.excerpt = entry.person.post_excerpt.clone();
            person.parent = new_id;
            let new_person = self.create(&person)?;
            for meta in &entry.person_meta {
                self.gateway
                    .insert_meta_raw(new_person, &meta.meta_key, &meta.meta_value)?;
            }
            debug!(product = new_id, person = new_person, "created person");
        }

        Ok(ImportedProduct {
            source_id,
            new_id,
            resources_created: doc.resources.len(),
            persons_created: doc.persons.len(),
        })
    }

    fn create(&self, post: &NewPost) -> Result<i64, BookingsHelperError> {
        let kind = post.post_type.as_str();
        let id = self.gateway.insert_post(post).map_err(|err| match err {
            BookingsHelperError::CreateFailed(_) => err,
            other => BookingsHelperError::create_failed(format!(
                "Failed to create {kind}: {}",
                other.message()
            )),
        })?;
        if id <= 0 {
            return Err(BookingsHelperError::create_failed(format!(
                "Failed to create {kind}: no id returned"
            )));
        }
        Ok(id)
    }
}

fn old_cost_dictionary(source_id: i64, key: &str, raw: Option<&str>) -> CostDictionary {
    let raw = raw.unwrap_or_default();
    match CostDictionary::try_parse(raw) {
        Some(costs) => costs,
        None => {
            if !raw.trim().is_empty() {
                warn!(source = source_id, key, "unreadable cost dictionary; entries reset to empty");
            }
            CostDictionary::default()
        }
    }
}

pub fn check_size(len: usize, max: u64) -> Result<(), BookingsHelperError> {
    if len as u64 > max {
        return Err(BookingsHelperError::size_exceeded(SIZE_EXCEEDED));
    }
    Ok(())
}
