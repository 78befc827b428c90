//! Bulk orchestrator: many aggregates in one export file or one import call.

use tracing::{info, warn};

use crate::{
    codec::{self, BatchWriter},
    errors::BookingsHelperError,
    extract::GraphExtractor,
    gateway::StorageGateway,
    import::{GraphImporter, ImportOptions, ImportReport, MISSING_RULES},
    model::{GlobalRule, ProductType},
    package::ContainerContents,
    rules::RuleSynchronizer,
};

/// Which products a batch export covers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchSelection {
    /// Every published product of these categories.
    Categories(Vec<ProductType>),
    /// Explicit product ids, duplicates dropped in first-seen order.
    Ids(Vec<i64>),
}

impl BatchSelection {
    pub fn all() -> Self {
        BatchSelection::Categories(ProductType::ALL.to_vec())
    }

    pub fn ids(ids: impl IntoIterator<Item = i64>) -> Self {
        let mut unique = Vec::new();
        for id in ids {
            if !unique.contains(&id) {
                unique.push(id);
            }
        }
        BatchSelection::Ids(unique)
    }
}

/// Where the rule list of a batch export goes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RulesPlacement {
    Omit,
    /// Inside the products envelope.
    Embedded,
    /// As a second payload next to the products document.
    Separate,
}

#[derive(Debug)]
pub struct BatchFailure {
    pub id: i64,
    pub error: BookingsHelperError,
}

#[derive(Debug)]
pub struct BatchExport {
    pub products_json: Vec<u8>,
    pub rules_json: Option<Vec<u8>>,
    pub exported: Vec<i64>,
    pub failures: Vec<BatchFailure>,
    pub warnings: Vec<String>,
}

/// Extracts every selected aggregate and streams it into one batch envelope.
/// A product that fails to extract is recorded and the rest still run.
pub fn export_batch<G: StorageGateway + ?Sized>(
    gateway: &G,
    selection: &BatchSelection,
    placement: RulesPlacement,
) -> Result<BatchExport, BookingsHelperError> {
    let extractor = GraphExtractor::new(gateway);
    let ids = match selection {
        BatchSelection::Categories(categories) => extractor.batch_ids(categories)?,
        BatchSelection::Ids(ids) => ids.clone(),
    };
    if ids.is_empty() {
        return Err(BookingsHelperError::none_found(
            "There are no booking products to export.",
        ));
    }

    let mut warnings = Vec::new();
    let rules = match placement {
        RulesPlacement::Omit => None,
        RulesPlacement::Embedded | RulesPlacement::Separate => {
            match RuleSynchronizer::new(gateway).export_rules() {
                Ok(rules) => Some(rules),
                Err(BookingsHelperError::NoRulesFound(message)) => {
                    warn!("batch export has no global availability rules to include");
                    warnings.push(message);
                    None
                }
                Err(err) => return Err(err),
            }
        }
    };

    let mut writer = BatchWriter::new(Vec::new())?;
    let mut exported = Vec::new();
    let mut failures = Vec::new();
    for id in ids {
        match extractor.extract_root(id) {
            Ok(doc) => {
                writer.push(id, &doc)?;
                exported.push(id);
            }
            Err(error) => {
                warn!(product = id, error = %error, "booking product skipped");
                failures.push(BatchFailure { id, error });
            }
        }
    }
    if exported.is_empty() {
        let reason = failures
            .first()
            .map(|f| f.error.message().to_string())
            .unwrap_or_default();
        return Err(BookingsHelperError::none_found(format!(
            "None of the selected booking products could be exported. {reason}"
        )));
    }

    let embedded: Option<&[GlobalRule]> = match placement {
        RulesPlacement::Embedded => rules.as_deref(),
        _ => None,
    };
    let products_json = writer.finish(embedded)?;
    let rules_json = match (placement, &rules) {
        (RulesPlacement::Separate, Some(rules)) => Some(codec::encode_rules(rules)?),
        _ => None,
    };

    info!(
        exported = exported.len(),
        failed = failures.len(),
        rules = rules.as_ref().map_or(0, Vec::len),
        "exported booking products"
    );
    Ok(BatchExport {
        products_json,
        rules_json,
        exported,
        failures,
        warnings,
    })
}

/// Imports an unpacked upload. The first failing aggregate ends the call.
pub fn import_batch<G: StorageGateway + ?Sized>(
    gateway: &G,
    contents: ContainerContents,
    options: ImportOptions,
) -> Result<ImportReport, BookingsHelperError> {
    match contents {
        ContainerContents::Document(bytes) => {
            GraphImporter::with_options(gateway, options).import_document(&bytes)
        }
        ContainerContents::ProductsWithRules { products, rules } => {
            let importer = GraphImporter::with_options(
                gateway,
                ImportOptions {
                    with_rules: false,
                    ..options
                },
            );
            let mut report = importer.import_document(&products)?;
            if options.with_rules {
                match codec::decode_rule_payload(&rules)? {
                    Some(rules) => {
                        let written = RuleSynchronizer::new(gateway)
                            .atomic(options.atomic)
                            .import_rules(&rules)?;
                        report.rules_imported = Some(written);
                    }
                    None => {
                        warn!("rule payload in the container is empty; stored rules kept");
                        report.warnings.push(MISSING_RULES.to_string());
                    }
                }
            } else {
                report
                    .warnings
                    .push("The global availability rules in the file were not imported.".into());
            }
            Ok(report)
        }
    }
}
