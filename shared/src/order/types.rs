//! Shared types for staged (draft) orders

use super::promotion::Promotion;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

// ============================================================================
// Order Type
// ============================================================================

/// Sales channel of an order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    /// Point-of-sale counter sale
    #[default]
    Counter,
    /// Online order (shipped)
    Online,
}

// ============================================================================
// Line Item Types
// ============================================================================

/// Product variant as resolved by the catalog, the input for adding a line
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductVariant {
    /// Variant ID
    pub variant_id: String,
    /// Product display name
    pub name: String,
    /// Color attribute
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Size attribute
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    /// List price
    pub unit_price: Decimal,
    /// Price after product-level discounts
    pub discounted_unit_price: Decimal,
    /// Units on hand (`None` = not tracked)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock: Option<u32>,
}

impl ProductVariant {
    /// Whether at least one unit can be sold
    pub fn is_in_stock(&self) -> bool {
        self.stock.is_none_or(|s| s > 0)
    }
}

/// Line item of a staged order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineItem {
    /// Line ID (assigned by server; provisional lines carry a local ID)
    pub line_id: String,
    /// Product variant ID
    pub variant_id: String,
    /// Product name
    pub name: String,
    /// Color attribute
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Size attribute
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    /// List price
    pub unit_price: Decimal,
    /// Price after discounts
    pub discounted_unit_price: Decimal,
    /// Quantity
    pub quantity: u32,
    /// Line total (computed by server: discounted_unit_price * quantity)
    pub line_total: Decimal,
    /// Local optimistic line not yet confirmed by the server
    #[serde(skip)]
    pub provisional: bool,
}

impl LineItem {
    /// Build a provisional quantity-1 line for a variant
    pub fn provisional(line_id: impl Into<String>, variant: &ProductVariant) -> Self {
        Self {
            line_id: line_id.into(),
            variant_id: variant.variant_id.clone(),
            name: variant.name.clone(),
            color: variant.color.clone(),
            size: variant.size.clone(),
            unit_price: variant.unit_price,
            discounted_unit_price: variant.discounted_unit_price,
            quantity: 1,
            line_total: variant.discounted_unit_price,
            provisional: true,
        }
    }

    /// Line total implied by the current quantity
    pub fn expected_total(&self) -> Decimal {
        self.discounted_unit_price * Decimal::from(self.quantity)
    }

    /// Display label, e.g. `"Linen Shirt (Blue / M)"`
    pub fn display_name(&self) -> String {
        match (&self.color, &self.size) {
            (Some(c), Some(s)) => format!("{} ({} / {})", self.name, c, s),
            (Some(a), None) | (None, Some(a)) => format!("{} ({})", self.name, a),
            (None, None) => self.name.clone(),
        }
    }
}

// ============================================================================
// Customer
// ============================================================================

/// Reference to a customer record in the customer directory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CustomerRef {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

// ============================================================================
// Update Payload
// ============================================================================

/// Distinguish an explicit `null` (clear) from an absent field (keep).
fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

/// Partial update of a staged order
///
/// `None` leaves a field untouched. For nullable fields `Some(None)` clears
/// the value on the server.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StagedOrderPatch {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_some"
    )]
    pub customer_id: Option<Option<String>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_some"
    )]
    pub promotion_code: Option<Option<String>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_some"
    )]
    pub payment_method_id: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tendered_cash: Option<Decimal>,
}

impl StagedOrderPatch {
    /// Check whether the patch changes nothing
    pub fn is_empty(&self) -> bool {
        self.customer_id.is_none()
            && self.promotion_code.is_none()
            && self.payment_method_id.is_none()
            && self.note.is_none()
            && self.tendered_cash.is_none()
    }
}

// ============================================================================
// Receipt
// ============================================================================

/// Invoice-for-printing artifact produced by a successful payment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReceiptSnapshot {
    pub order_id: String,
    pub receipt_number: String,
    pub order_type: OrderType,
    pub items: Vec<LineItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer: Option<CustomerRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promotion: Option<Promotion>,
    pub payment_method_id: String,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub tendered_cash: Decimal,
    pub change_due: Decimal,
    pub finalized_at: i64,
}
