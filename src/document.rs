//! Wire records of the export document and their mapping to the typed model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    errors::BookingsHelperError,
    model::{GlobalRule, MetaEntry, Person, Product, ProductType, Resource, lenient},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    #[serde(rename = "ID", deserialize_with = "lenient::i64")]
    pub id: i64,
    #[serde(default, deserialize_with = "lenient::string")]
    pub post_title: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub post_content: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub post_status: String,
    #[serde(
        rename = "type",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string"
    )]
    pub product_type: Option<String>,
}

impl ProductRecord {
    /// Category tag of the product, `booking` when the document carries none.
    pub fn product_type(&self) -> Result<ProductType, BookingsHelperError> {
        match self.product_type.as_deref().map(str::trim) {
            None | Some("") => Ok(ProductType::default()),
            Some(tag) => tag.parse().map_err(|_| {
                BookingsHelperError::malformed(format!(
                    "product {} has unsupported type {tag}",
                    self.id
                ))
            }),
        }
    }
}

impl From<&Product> for ProductRecord {
    fn from(product: &Product) -> Self {
        Self {
            id: product.id,
            post_title: product.title.clone(),
            post_content: product.content.clone(),
            post_status: product.status.clone(),
            product_type: Some(product.product_type.as_str().to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    #[serde(rename = "ID", deserialize_with = "lenient::i64")]
    pub id: i64,
    #[serde(default, deserialize_with = "lenient::string")]
    pub post_title: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub post_status: String,
}

impl From<&Resource> for ResourceRecord {
    fn from(resource: &Resource) -> Self {
        Self {
            id: resource.id,
            post_title: resource.title.clone(),
            post_status: resource.status.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonRecord {
    #[serde(rename = "ID", deserialize_with = "lenient::i64")]
    pub id: i64,
    #[serde(default, deserialize_with = "lenient::string")]
    pub post_title: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub post_excerpt: String,
}

impl From<&Person> for PersonRecord {
    fn from(person: &Person) -> Self {
        Self {
            id: person.id,
            post_title: person.title.clone(),
            post_excerpt: person.excerpt.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceEntry {
    pub resource: ResourceRecord,
    #[serde(default)]
    pub resource_meta: Vec<MetaEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonEntry {
    pub person: PersonRecord,
    #[serde(default)]
    pub person_meta: Vec<MetaEntry>,
}

/// Snapshot of one booking product aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    pub product: ProductRecord,
    #[serde(default)]
    pub product_meta: Vec<MetaEntry>,
    #[serde(default)]
    pub resources: Vec<ResourceEntry>,
    #[serde(default)]
    pub persons: Vec<PersonEntry>,
}

impl ExportDocument {
    pub fn new(product: &Product, product_meta: Vec<MetaEntry>) -> Self {
        Self {
            product: ProductRecord::from(product),
            product_meta,
            resources: Vec::new(),
            persons: Vec::new(),
        }
    }

    pub fn push_resource(&mut self, resource: &Resource, meta: Vec<MetaEntry>) {
        self.resources.push(ResourceEntry {
            resource: ResourceRecord::from(resource),
            resource_meta: meta,
        });
    }

    pub fn push_person(&mut self, person: &Person, meta: Vec<MetaEntry>) {
        self.persons.push(PersonEntry {
            person: PersonRecord::from(person),
            person_meta: meta,
        });
    }

    pub fn source_id(&self) -> i64 {
        self.product.id
    }

    /// First root metadata value stored under `key`.
    pub fn product_meta_value(&self, key: &str) -> Option<&str> {
        self.product_meta
            .iter()
            .find(|entry| entry.meta_key == key)
            .map(|entry| entry.meta_value.as_str())
    }
}

/// Several aggregates keyed by their source product id, optionally with the rule list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchDocument {
    pub products: BTreeMap<i64, ExportDocument>,
    pub rules: Option<Vec<GlobalRule>>,
}
