//! Export and import of booking products, their resources and persons, and the
//! global availability rule list, against a SQLite-backed store.

pub mod batch;
pub mod cleanup;
pub mod codec;
pub mod config;
pub mod document;
pub mod errors;
pub mod extract;
pub mod gateway;
pub mod import;
pub mod logging;
pub mod model;
pub mod ops;
pub mod package;
pub mod rules;
pub mod schema;
pub mod store;

pub use crate::batch::{BatchSelection, RulesPlacement};
pub use crate::cleanup::CleanupReport;
pub use crate::config::{DatabaseLocation, HelperConfig};
pub use crate::document::{BatchDocument, ExportDocument};
pub use crate::errors::BookingsHelperError;
pub use crate::extract::GraphExtractor;
pub use crate::gateway::{RuleStorage, StorageGateway};
pub use crate::import::{GraphImporter, ImportOptions, ImportReport, ImportedProduct};
pub use crate::model::{GlobalRule, MetaEntry, MetaValue, ProductType};
pub use crate::ops::{Notice, NoticeLevel};
pub use crate::rules::RuleSynchronizer;
pub use crate::store::BookingStore;
