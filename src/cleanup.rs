//! Repair pass for duplicated product/resource relationship rows.

use ahash::AHashMap;
use serde::Serialize;
use tracing::{debug, info};

use crate::{
    errors::BookingsHelperError,
    gateway::StorageGateway,
    model::{Association, HAS_RESOURCES, PostType},
};

pub const NO_RESOURCE_PRODUCTS: &str = "No products with resources found.";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub products_scanned: usize,
    pub rows_before: usize,
    pub rows_after: usize,
}

impl CleanupReport {
    pub fn duplicates_removed(&self) -> usize {
        self.rows_before.saturating_sub(self.rows_after)
    }
}

/// Rewrites the relationship rows of every resource-bearing product so each
/// resource appears once. The surviving row of a duplicated resource takes the
/// sort position of its last occurrence and the list position of its first.
///
/// Replacement rows are written before the originals are deleted, so an
/// interrupted run leaves duplicates behind and can be repeated.
pub fn clean_up_relationships<G: StorageGateway + ?Sized>(
    gateway: &G,
) -> Result<CleanupReport, BookingsHelperError> {
    let products = gateway.find_by_meta(PostType::Product, HAS_RESOURCES, &["1", "yes"])?;
    if products.is_empty() {
        return Err(BookingsHelperError::none_found(NO_RESOURCE_PRODUCTS));
    }

    let mut report = CleanupReport {
        products_scanned: products.len(),
        ..CleanupReport::default()
    };
    for product in products {
        let rows = gateway.fetch_associations(product)?;
        let kept = dedupe(&rows);
        report.rows_before += rows.len();
        report.rows_after += kept.len();

        for row in &kept {
            gateway.insert_association(product, row.resource_id, row.sort_order)?;
        }
        for row in &rows {
            gateway.delete_association(row.id)?;
        }
        debug!(
            product,
            before = rows.len(),
            after = kept.len(),
            "rewrote relationships"
        );
    }
    info!(
        products = report.products_scanned,
        removed = report.duplicates_removed(),
        "cleaned up booking resource relationships"
    );
    Ok(report)
}

fn dedupe(rows: &[Association]) -> Vec<Association> {
    let mut position: AHashMap<i64, usize> = AHashMap::with_capacity(rows.len());
    let mut kept: Vec<Association> = Vec::with_capacity(rows.len());
    for row in rows {
        match position.get(&row.resource_id) {
            Some(&idx) => kept[idx] = row.clone(),
            None => {
                position.insert(row.resource_id, kept.len());
                kept.push(row.clone());
            }
        }
    }
    kept
}
