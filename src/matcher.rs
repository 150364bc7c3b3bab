// src/matcher.rs

use crate::records::{InventoryItem, LineItem, MatchResult, MatchedItem, RequestedItem};
use tracing::debug;

/// Decides whether a requested name refers to a catalog entry.
///
/// Pluggable so token-overlap or edit-distance strategies can replace the
/// default without touching call sites.
pub trait MatchStrategy: Send + Sync {
    fn matches(&self, requested_name: &str, item: &InventoryItem) -> bool;
}

/// Default strategy: either name contains the other (case-insensitive), or
/// the requested name equals the SKU exactly.
pub struct ContainmentMatch;

impl MatchStrategy for ContainmentMatch {
    fn matches(&self, requested_name: &str, item: &InventoryItem) -> bool {
        let requested = requested_name.trim().to_lowercase();
        let catalog = item.name.trim().to_lowercase();
        // Empty strings would substring-match everything
        if requested.is_empty() || catalog.is_empty() {
            return false;
        }
        catalog.contains(&requested)
            || requested.contains(&catalog)
            || item.sku.eq_ignore_ascii_case(requested_name.trim())
    }
}

/// Partition requested items into available and missing against the live
/// catalog. First catalog match wins; one deterministic pass, no ranking.
pub fn reconcile(
    requests: &[RequestedItem],
    catalog: &[InventoryItem],
    strategy: &dyn MatchStrategy,
) -> MatchResult {
    let mut result = MatchResult::default();

    for request in requests {
        match catalog.iter().find(|item| strategy.matches(&request.name, item)) {
            Some(item) => {
                let is_shortage = item.stock < request.quantity;
                debug!(
                    requested = %request.name,
                    matched = %item.name,
                    stock = item.stock,
                    quantity = request.quantity,
                    is_shortage,
                    "Matched inventory item"
                );
                result.available.push(MatchedItem {
                    item: request.clone(),
                    inventory_item: item.clone(),
                    is_shortage,
                });
            }
            None => {
                debug!(requested = %request.name, "No inventory match");
                result.missing.push(request.clone());
            }
        }
    }

    result
}

/// Reconcile extracted PO line items against the catalog. Quantities are
/// rounded to whole units before the stock comparison.
pub fn reconcile_line_items(
    items: &[LineItem],
    catalog: &[InventoryItem],
    strategy: &dyn MatchStrategy,
) -> MatchResult {
    let requests: Vec<RequestedItem> = items
        .iter()
        .map(|item| RequestedItem {
            name: item.name.clone(),
            quantity: item.item_quantity.max(0.0).round() as u32,
        })
        .collect();
    reconcile(&requests, catalog, strategy)
}
