// src/records.rs

use serde::{Deserialize, Serialize};

/// The three canonical document variants synthesized from a single PO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentKind {
    #[serde(rename = "Tax Invoice")]
    TaxInvoice,
    #[serde(rename = "Delivery Challan")]
    DeliveryChallan,
    #[serde(rename = "Purchase Invoice")]
    PurchaseInvoice,
}

/// A single extracted line item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    #[serde(default)]
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub item_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_specification: Option<String>,
    #[serde(default)]
    pub item_quantity: f64,
    #[serde(default)]
    pub unit_of_measure: Option<String>,
    #[serde(default)]
    pub package_size: Option<String>,
    #[serde(default)]
    pub item_rate: f64,
}

/// One structured document produced from a PO, either by the parser or by
/// the placeholder generator, never partially.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    #[serde(rename = "type")]
    pub kind: DocumentKind,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub customer_address: Option<String>,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub po_number: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub total: f64,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub items: Vec<LineItem>,
    /// Tax percentage applied by the Tax Invoice and Delivery Challan formulas.
    #[serde(default)]
    pub tax_rate: f64,
    /// Delivery charge added by the Purchase Invoice and Delivery Challan formulas.
    #[serde(default)]
    pub delivery: f64,
}

impl DocumentRecord {
    /// Sum of `itemQuantity * itemRate` over all items.
    pub fn subtotal(&self) -> f64 {
        self.items
            .iter()
            .map(|it| it.item_quantity * it.item_rate)
            .sum()
    }

    /// The total this record's kind prescribes.
    ///
    /// Tax Invoice carries the tax amount only; Purchase Invoice adds the
    /// delivery charge to the subtotal; Delivery Challan is the general
    /// three-term formula (tax is 0 in practice for that kind).
    pub fn expected_total(&self) -> f64 {
        let subtotal = self.subtotal();
        match self.kind {
            DocumentKind::TaxInvoice => subtotal * self.tax_rate / 100.0,
            DocumentKind::PurchaseInvoice => subtotal + self.delivery,
            DocumentKind::DeliveryChallan => {
                subtotal + subtotal * self.tax_rate / 100.0 + self.delivery
            }
        }
    }
}

/// One row of the live inventory catalog. Owned and mutated elsewhere;
/// this crate only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub sku: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub stock: u32,
    #[serde(default)]
    pub price: f64,
}

/// An item somebody asked for, by name, before reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedItem {
    pub name: String,
    pub quantity: u32,
}

/// A request matched to a catalog entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedItem {
    pub item: RequestedItem,
    pub inventory_item: InventoryItem,
    /// True when current stock cannot cover the requested quantity.
    pub is_shortage: bool,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MatchResult {
    pub available: Vec<MatchedItem>,
    pub missing: Vec<RequestedItem>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: DocumentKind, tax_rate: f64, delivery: f64) -> DocumentRecord {
        DocumentRecord {
            kind,
            customer: Some("Acme Traders".to_string()),
            customer_address: None,
            customer_phone: None,
            customer_email: None,
            po_number: Some("PO-1042".to_string()),
            date: Some("2026-02-16".to_string()),
            total: 0.0,
            status: Some("Pending".to_string()),
            items: vec![
                LineItem {
                    id: 1,
                    name: "A4 Paper".to_string(),
                    item_description: None,
                    item_specification: None,
                    item_quantity: 10.0,
                    unit_of_measure: Some("ream".to_string()),
                    package_size: None,
                    item_rate: 5.0,
                },
                LineItem {
                    id: 2,
                    name: "Stapler".to_string(),
                    item_description: None,
                    item_specification: None,
                    item_quantity: 2.0,
                    unit_of_measure: Some("piece".to_string()),
                    package_size: None,
                    item_rate: 25.0,
                },
            ],
            tax_rate,
            delivery,
        }
    }

    #[test]
    fn tax_invoice_total_is_tax_amount_only() {
        // subtotal = 10*5 + 2*25 = 100; 18% of 100 = 18
        let rec = record(DocumentKind::TaxInvoice, 18.0, 40.0);
        assert!((rec.expected_total() - 18.0).abs() < 1e-9);
    }

    #[test]
    fn purchase_invoice_total_adds_delivery() {
        let rec = record(DocumentKind::PurchaseInvoice, 18.0, 40.0);
        assert!((rec.expected_total() - 140.0).abs() < 1e-9);
    }

    #[test]
    fn delivery_challan_total_uses_all_three_terms() {
        // 100 + 18 + 40
        let rec = record(DocumentKind::DeliveryChallan, 18.0, 40.0);
        assert!((rec.expected_total() - 158.0).abs() < 1e-9);
    }

    #[test]
    fn record_serializes_with_camel_case_wire_shape() {
        let rec = record(DocumentKind::TaxInvoice, 18.0, 0.0);
        let json = serde_json::to_string(&rec).unwrap();
        assert!(json.contains(r#""type":"Tax Invoice""#));
        assert!(json.contains(r#""poNumber":"PO-1042""#));
        assert!(json.contains(r#""taxRate":18.0"#));
        assert!(json.contains(r#""itemQuantity":10.0"#));
        // Unset specification stays off the wire entirely
        assert!(!json.contains("itemSpecification"));
    }

    #[test]
    fn record_parses_with_nulls_and_missing_numerics() {
        let json = r#"{
            "type": "Purchase Invoice",
            "customer": null,
            "items": [{"name": "Toner", "itemQuantity": 3, "itemRate": 12.5}]
        }"#;
        let rec: DocumentRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.kind, DocumentKind::PurchaseInvoice);
        assert!(rec.customer.is_none());
        assert_eq!(rec.items.len(), 1);
        assert!((rec.subtotal() - 37.5).abs() < 1e-9);
        assert_eq!(rec.delivery, 0.0);
    }
}
