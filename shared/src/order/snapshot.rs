//! Staged order snapshot - the server's authoritative view of a draft order
//!
//! Money fields are computed by the order service and mirrored verbatim by
//! clients; they are never recomputed locally.

use super::promotion::Promotion;
use super::types::{CustomerRef, LineItem, OrderType};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Staged order snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StagedOrderSnapshot {
    /// Staged order ID (assigned by server)
    pub id: String,
    /// Sales channel
    #[serde(default)]
    pub order_type: OrderType,
    /// Line items in display order
    pub items: Vec<LineItem>,
    /// Bound customer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer: Option<CustomerRef>,
    /// Applied promotion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promotion: Option<Promotion>,
    /// Selected payment method
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method_id: Option<String>,
    /// Free-text note
    #[serde(default)]
    pub note: String,
    /// Cash tendered by the customer
    #[serde(default)]
    pub tendered_cash: Decimal,
    /// Sum of line totals
    pub subtotal: Decimal,
    /// Promotion discount
    #[serde(default)]
    pub discount: Decimal,
    /// Amount payable
    pub total: Decimal,
    /// Last update timestamp
    pub updated_at: i64,
}

impl StagedOrderSnapshot {
    /// Create an empty snapshot
    pub fn new(id: impl Into<String>, order_type: OrderType) -> Self {
        Self {
            id: id.into(),
            order_type,
            items: Vec::new(),
            customer: None,
            promotion: None,
            payment_method_id: None,
            note: String::new(),
            tendered_cash: Decimal::ZERO,
            subtotal: Decimal::ZERO,
            discount: Decimal::ZERO,
            total: Decimal::ZERO,
            updated_at: crate::util::now_millis(),
        }
    }

    /// Total number of units across all lines
    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    /// Check `total = max(0, subtotal - discount)`
    pub fn totals_consistent(&self) -> bool {
        self.total == (self.subtotal - self.discount).max(Decimal::ZERO)
    }

    /// Summary row for listings
    pub fn summary(&self) -> StagedOrderSummary {
        StagedOrderSummary {
            id: self.id.clone(),
            order_type: self.order_type,
            item_count: self.item_count(),
            total: self.total,
            updated_at: self.updated_at,
        }
    }
}

/// Staged order list entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StagedOrderSummary {
    pub id: String,
    #[serde(default)]
    pub order_type: OrderType,
    pub item_count: u32,
    pub total: Decimal,
    pub updated_at: i64,
}

/// Response of staged order creation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StagedOrderCreated {
    pub id: String,
}
