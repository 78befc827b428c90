//! User-facing operations. Each call returns one [`Notice`]; errors are
//! rendered into it and never escape.

use std::{fmt, path::Path, path::PathBuf};

use chrono::{Local, NaiveDate, Utc};
use serde::Serialize;
use tracing::error;

use crate::{
    batch::{self, BatchSelection, RulesPlacement},
    cleanup,
    codec,
    config::HelperConfig,
    errors::BookingsHelperError,
    extract::GraphExtractor,
    gateway::StorageGateway,
    import::ImportReport,
    package::{self, ContainerContents},
    rules::RuleSynchronizer,
};

pub const PRODUCT_IMPORTED: &str = "Booking Product imported successfully!";
pub const PRODUCTS_IMPORTED: &str = "Booking Products imported successfully!";
pub const RULES_IMPORTED: &str = "Global Availability Rules imported successfully!";
pub const CLEANED_UP: &str = "Booking resource relationships cleaned up successfully!";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Warning,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    /// File written by an export.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<PathBuf>,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
            location: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
            location: None,
        }
    }

    fn with_location(mut self, location: PathBuf) -> Self {
        self.location = Some(location);
        self
    }

    pub fn is_success(&self) -> bool {
        self.level == NoticeLevel::Success
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            NoticeLevel::Success => "success",
            NoticeLevel::Warning => "warning",
        };
        write!(f, "{level}: {}", self.message)
    }
}

impl From<BookingsHelperError> for Notice {
    fn from(err: BookingsHelperError) -> Self {
        error!(error = %err, "operation failed");
        Notice::warning(err.message())
    }
}

fn render(result: Result<Notice, BookingsHelperError>) -> Notice {
    result.unwrap_or_else(Notice::from)
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub fn export_product<G: StorageGateway + ?Sized>(
    gateway: &G,
    config: &HelperConfig,
    id: i64,
) -> Notice {
    render(try_export_product(gateway, config, id))
}

pub fn export_products<G: StorageGateway + ?Sized>(
    gateway: &G,
    config: &HelperConfig,
    selection: &BatchSelection,
    with_rules: bool,
) -> Notice {
    render(try_export_products(gateway, config, selection, with_rules))
}

pub fn export_rules<G: StorageGateway + ?Sized>(gateway: &G, config: &HelperConfig) -> Notice {
    render(try_export_rules(gateway, config))
}

pub fn import_product<G: StorageGateway + ?Sized>(
    gateway: &G,
    config: &HelperConfig,
    file: &Path,
) -> Notice {
    render(
        import_file(gateway, config, file, false)
            .map(|report| Notice::success(import_message(PRODUCT_IMPORTED, &report))),
    )
}

pub fn import_products<G: StorageGateway + ?Sized>(
    gateway: &G,
    config: &HelperConfig,
    file: &Path,
    with_rules: bool,
) -> Notice {
    render(
        import_file(gateway, config, file, with_rules)
            .map(|report| Notice::success(import_message(PRODUCTS_IMPORTED, &report))),
    )
}

pub fn import_rules<G: StorageGateway + ?Sized>(
    gateway: &G,
    config: &HelperConfig,
    file: &Path,
) -> Notice {
    render(try_import_rules(gateway, config, file))
}

pub fn clean_up<G: StorageGateway + ?Sized>(gateway: &G) -> Notice {
    render(cleanup::clean_up_relationships(gateway).map(|report| {
        Notice::success(format!(
            "{CLEANED_UP} {} product(s) scanned, {} duplicate row(s) removed.",
            report.products_scanned,
            report.duplicates_removed()
        ))
    }))
}

fn try_export_product<G: StorageGateway + ?Sized>(
    gateway: &G,
    config: &HelperConfig,
    id: i64,
) -> Result<Notice, BookingsHelperError> {
    let doc = GraphExtractor::new(gateway).extract_root(id)?;
    let json = codec::encode_document(&doc)?;
    let packed = package::pack_document(&package::product_stem(id, today()), json)?;
    let path = packed.write_to(&config.export_dir)?;
    Ok(Notice::success(format!(
        "Booking product exported. Location: {}",
        path.display()
    ))
    .with_location(path))
}

fn try_export_products<G: StorageGateway + ?Sized>(
    gateway: &G,
    config: &HelperConfig,
    selection: &BatchSelection,
    with_rules: bool,
) -> Result<Notice, BookingsHelperError> {
    let placement = match (with_rules, package::archive_available()) {
        (false, _) => RulesPlacement::Omit,
        (true, true) => RulesPlacement::Separate,
        (true, false) => RulesPlacement::Embedded,
    };
    let export = batch::export_batch(gateway, selection, placement)?;
    let stem = package::batch_stem(with_rules, today(), Utc::now().timestamp());
    let packed = match export.rules_json {
        Some(rules) => package::pack_products_with_rules(&stem, &export.products_json, &rules)?,
        None => package::pack_document(&stem, export.products_json)?,
    };
    let path = packed.write_to(&config.export_dir)?;

    let mut message = format!(
        "{} booking product(s) exported. Location: {}",
        export.exported.len(),
        path.display()
    );
    for failure in &export.failures {
        message.push_str(&format!(
            " Product {} skipped: {}",
            failure.id,
            failure.error.message()
        ));
    }
    for warning in &export.warnings {
        message.push(' ');
        message.push_str(warning);
    }
    Ok(Notice::success(message).with_location(path))
}

fn try_export_rules<G: StorageGateway + ?Sized>(
    gateway: &G,
    config: &HelperConfig,
) -> Result<Notice, BookingsHelperError> {
    let rules = RuleSynchronizer::new(gateway).export_rules()?;
    let json = codec::encode_rules(&rules)?;
    let stem = package::rules_stem(today(), &mut rand::thread_rng());
    let path = package::pack_document(&stem, json)?.write_to(&config.export_dir)?;
    Ok(Notice::success(format!(
        "{} global availability rule(s) exported. Location: {}",
        rules.len(),
        path.display()
    ))
    .with_location(path))
}

fn try_import_rules<G: StorageGateway + ?Sized>(
    gateway: &G,
    config: &HelperConfig,
    file: &Path,
) -> Result<Notice, BookingsHelperError> {
    let bytes = package::read_limited(file, config.max_document_bytes)?;
    let bytes = match package::open_container(bytes, config.max_document_bytes)? {
        ContainerContents::Document(bytes) => bytes,
        ContainerContents::ProductsWithRules { rules, .. } => rules,
    };
    let rules = codec::decode_rules(&bytes)?;
    let written = RuleSynchronizer::new(gateway)
        .atomic(config.atomic_import)
        .import_rules(&rules)?;
    Ok(Notice::success(format!("{RULES_IMPORTED} ({written} rule(s))")))
}

fn import_file<G: StorageGateway + ?Sized>(
    gateway: &G,
    config: &HelperConfig,
    file: &Path,
    with_rules: bool,
) -> Result<ImportReport, BookingsHelperError> {
    let bytes = package::read_limited(file, config.max_document_bytes)?;
    let contents = package::open_container(bytes, config.max_document_bytes)?;
    batch::import_batch(gateway, contents, config.import_options(with_rules))
}

fn import_message(headline: &str, report: &ImportReport) -> String {
    let mut message = headline.to_string();
    let ids: Vec<String> = report
        .products
        .iter()
        .map(|p| format!("#{} -> #{}", p.source_id, p.new_id))
        .collect();
    if !ids.is_empty() {
        message.push_str(&format!(
            " {} product(s) ({}), {} resource(s), {} person(s) created.",
            report.products.len(),
            ids.join(", "),
            report.resources_created(),
            report.persons_created()
        ));
    }
    if let Some(rules) = report.rules_imported {
        message.push_str(&format!(" {rules} global availability rule(s) imported."));
    }
    for warning in &report.warnings {
        message.push(' ');
        message.push_str(warning);
    }
    message
}
