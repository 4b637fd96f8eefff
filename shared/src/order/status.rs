//! Finalized order status lifecycle
//!
//! The guard table only answers "may this transition be requested from the
//! current status". The resulting status is always read back from the order
//! service, so there is deliberately no `next_status` here.
//!
//! ```text
//! Online:  Pending → Confirmed → Preparing → Shipping → Delivered → Completed
//!          Pending → OutOfStock
//!          Pending | OutOfStock → Cancelled
//!          Delivered | Completed → ReturnRequested → ReturnConfirmed → Returned
//!          ReturnRequested → (rejected, back to the prior state)
//! Counter: AwaitingCounter → Paid → Returned
//! ```

use super::promotion::Promotion;
use super::types::{CustomerRef, LineItem, OrderType};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Order status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Preparing,
    Shipping,
    Delivered,
    Completed,
    OutOfStock,
    Cancelled,
    ReturnRequested,
    ReturnConfirmed,
    Returned,
    AwaitingCounter,
    Paid,
}

impl OrderStatus {
    /// No transition leaves this status
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Returned)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Named transition requested from the order service
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StatusTransition {
    Confirm,
    StartPreparing,
    Ship,
    Deliver,
    Complete,
    MarkOutOfStock,
    Cancel,
    RequestReturn,
    ConfirmReturn,
    RejectReturn,
    CompleteReturn,
    MarkPaid,
    ReturnAtCounter,
}

impl StatusTransition {
    /// Every transition, in guard-table order
    pub const ALL: [StatusTransition; 13] = [
        Self::Confirm,
        Self::StartPreparing,
        Self::Ship,
        Self::Deliver,
        Self::Complete,
        Self::MarkOutOfStock,
        Self::Cancel,
        Self::RequestReturn,
        Self::ConfirmReturn,
        Self::RejectReturn,
        Self::CompleteReturn,
        Self::MarkPaid,
        Self::ReturnAtCounter,
    ];

    /// Order type the transition belongs to
    pub fn order_type(&self) -> OrderType {
        match self {
            Self::MarkPaid | Self::ReturnAtCounter => OrderType::Counter,
            _ => OrderType::Online,
        }
    }

    /// Statuses the transition may be requested from
    pub fn allowed_from(&self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Self::Confirm => &[Pending],
            Self::StartPreparing => &[Confirmed],
            Self::Ship => &[Preparing],
            Self::Deliver => &[Shipping],
            Self::Complete => &[Delivered],
            Self::MarkOutOfStock => &[Pending],
            Self::Cancel => &[Pending, OutOfStock],
            Self::RequestReturn => &[Delivered, Completed],
            Self::ConfirmReturn | Self::RejectReturn => &[ReturnRequested],
            Self::CompleteReturn => &[ReturnConfirmed],
            Self::MarkPaid => &[AwaitingCounter],
            Self::ReturnAtCounter => &[Paid],
        }
    }

    /// Destructive transitions need a non-empty reason
    pub fn requires_reason(&self) -> bool {
        matches!(
            self,
            Self::MarkOutOfStock
                | Self::Cancel
                | Self::RequestReturn
                | Self::RejectReturn
                | Self::ReturnAtCounter
        )
    }

    /// Validate a request against the guard table
    pub fn check(
        &self,
        order_type: OrderType,
        current: OrderStatus,
        reason: Option<&str>,
    ) -> Result<(), TransitionRejection> {
        if self.order_type() != order_type {
            return Err(TransitionRejection::WrongOrderType {
                transition: *self,
                order_type,
            });
        }
        if !self.allowed_from().contains(&current) {
            return Err(TransitionRejection::InvalidSource {
                transition: *self,
                from: current,
            });
        }
        if self.requires_reason() && reason.is_none_or(|r| r.trim().is_empty()) {
            return Err(TransitionRejection::ReasonRequired(*self));
        }
        Ok(())
    }

    /// Transitions that may currently be offered for an order
    pub fn available_for(order_type: OrderType, current: OrderStatus) -> Vec<StatusTransition> {
        Self::ALL
            .into_iter()
            .filter(|t| t.order_type() == order_type && t.allowed_from().contains(&current))
            .collect()
    }
}

impl fmt::Display for StatusTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Guard failure
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum TransitionRejection {
    #[error("{transition} does not apply to {order_type:?} orders")]
    WrongOrderType {
        transition: StatusTransition,
        order_type: OrderType,
    },
    #[error("{transition} is not allowed from {from}")]
    InvalidSource {
        transition: StatusTransition,
        from: OrderStatus,
    },
    #[error("{0} requires a reason")]
    ReasonRequired(StatusTransition),
}

/// Body of a status transition request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransitionRequest {
    pub transition: StatusTransition,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Paid order record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinalizedOrder {
    pub id: String,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub items: Vec<LineItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer: Option<CustomerRef>,
    /// Promotion as it was when the order was paid
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promotion: Option<Promotion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method_id: Option<String>,
    pub subtotal: Decimal,
    #[serde(default)]
    pub discount: Decimal,
    pub total: Decimal,
    /// Cancellation / return / rejection reason of the last such transition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_online_happy_path_guards() {
        let steps = [
            (StatusTransition::Confirm, OrderStatus::Pending),
            (StatusTransition::StartPreparing, OrderStatus::Confirmed),
            (StatusTransition::Ship, OrderStatus::Preparing),
            (StatusTransition::Deliver, OrderStatus::Shipping),
            (StatusTransition::Complete, OrderStatus::Delivered),
        ];
        for (t, from) in steps {
            assert_eq!(t.check(OrderType::Online, from, None), Ok(()));
        }
    }

    #[test]
    fn test_no_skipping() {
        assert_eq!(
            StatusTransition::Ship.check(OrderType::Online, OrderStatus::Confirmed, None),
            Err(TransitionRejection::InvalidSource {
                transition: StatusTransition::Ship,
                from: OrderStatus::Confirmed,
            })
        );
    }

    #[test]
    fn test_cancel_sources_and_reason() {
        let t = StatusTransition::Cancel;
        assert_eq!(
            t.check(OrderType::Online, OrderStatus::Pending, None),
            Err(TransitionRejection::ReasonRequired(t))
        );
        assert_eq!(
            t.check(OrderType::Online, OrderStatus::Pending, Some("   ")),
            Err(TransitionRejection::ReasonRequired(t))
        );
        assert_eq!(
            t.check(OrderType::Online, OrderStatus::OutOfStock, Some("no restock")),
            Ok(())
        );
        assert!(t
            .check(OrderType::Online, OrderStatus::Confirmed, Some("changed mind"))
            .is_err());
    }

    #[test]
    fn test_counter_return_requires_paid() {
        let t = StatusTransition::ReturnAtCounter;
        assert!(matches!(
            t.check(OrderType::Counter, OrderStatus::AwaitingCounter, Some("defect")),
            Err(TransitionRejection::InvalidSource { .. })
        ));
        assert_eq!(
            t.check(OrderType::Counter, OrderStatus::Paid, Some("defect")),
            Ok(())
        );
    }

    #[test]
    fn test_wrong_order_type() {
        assert!(matches!(
            StatusTransition::Confirm.check(OrderType::Counter, OrderStatus::Pending, None),
            Err(TransitionRejection::WrongOrderType { .. })
        ));
    }

    #[test]
    fn test_return_subflow() {
        assert_eq!(
            StatusTransition::available_for(OrderType::Online, OrderStatus::ReturnRequested),
            vec![StatusTransition::ConfirmReturn, StatusTransition::RejectReturn]
        );
        assert_eq!(
            StatusTransition::available_for(OrderType::Online, OrderStatus::ReturnConfirmed),
            vec![StatusTransition::CompleteReturn]
        );
        assert!(StatusTransition::available_for(OrderType::Online, OrderStatus::Cancelled)
            .is_empty());
        assert!(OrderStatus::Returned.is_terminal());
    }

    #[test]
    fn test_wire_names() {
        let req = TransitionRequest {
            transition: StatusTransition::ReturnAtCounter,
            reason: Some("wrong size".to_string()),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(
            json,
            r#"{"transition":"return_at_counter","reason":"wrong size"}"#
        );
        let status: OrderStatus = serde_json::from_str(r#""AWAITING_COUNTER""#).unwrap();
        assert_eq!(status, OrderStatus::AwaitingCounter);
    }
}
