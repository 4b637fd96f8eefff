//! Unified error codes for the till workspace
//!
//! Error codes travel inside the [`ApiResponse`](super::ApiResponse) envelope
//! returned by the order service and are organized by category:
//! - 0xxx: General errors
//! - 1xxx: Authentication errors
//! - 2xxx: Permission errors
//! - 4xxx: Order errors
//! - 5xxx: Payment errors
//! - 6xxx: Promotion errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values for efficient serialization
/// and cross-language compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Resource already exists
    AlreadyExists = 4,
    /// Invalid request
    InvalidRequest = 5,
    /// Required field missing
    RequiredField = 7,
    /// Value out of range
    ValueOutOfRange = 8,

    // ==================== 1xxx: Auth ====================
    /// User is not authenticated
    NotAuthenticated = 1001,
    /// Token has expired
    TokenExpired = 1003,

    // ==================== 2xxx: Permission ====================
    /// Permission denied
    PermissionDenied = 2001,

    // ==================== 4xxx: Order ====================
    /// Staged order not found
    StagedOrderNotFound = 4001,
    /// Finalized order not found
    OrderNotFound = 4002,
    /// Line item not found
    LineItemNotFound = 4003,
    /// Order has no line items
    OrderEmpty = 4004,
    /// Staged order was already finalized
    OrderAlreadyFinalized = 4005,
    /// Order changed on the server since it was read
    OrderStateConflict = 4006,
    /// Requested status transition is not allowed from the current status
    InvalidStatusTransition = 4007,
    /// Destructive transition requested without a reason
    ReasonRequired = 4008,
    /// Variant is out of stock
    ProductOutOfStock = 4009,

    // ==================== 5xxx: Payment ====================
    /// Tendered amount is below the order total
    PaymentInsufficientAmount = 5001,
    /// No payment method selected
    PaymentMethodRequired = 5002,
    /// Payment processing failed
    PaymentFailed = 5003,

    // ==================== 6xxx: Promotion ====================
    /// Promotion code not found
    PromotionNotFound = 6001,
    /// Promotion validity window has ended
    PromotionExpired = 6002,
    /// Promotion validity window has not started
    PromotionNotYetValid = 6003,
    /// Promotion usage cap reached
    PromotionUsageExhausted = 6004,
    /// Order subtotal below the promotion minimum
    PromotionBelowMinimum = 6005,

    // ==================== 9xxx: System ====================
    /// Internal server error
    InternalError = 9001,
    /// Network error
    NetworkError = 9003,
    /// Operation timeout
    TimeoutError = 9004,
    /// Configuration error
    ConfigError = 9005,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if this is a success code
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    /// Whether the code reports drift between the caller's view and the
    /// authoritative record (the caller should resync, not retry).
    pub const fn is_conflict(&self) -> bool {
        matches!(
            self,
            ErrorCode::OrderStateConflict
                | ErrorCode::InvalidStatusTransition
                | ErrorCode::OrderAlreadyFinalized
                | ErrorCode::ProductOutOfStock
        )
    }

    /// Get the developer-facing English message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            // General
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::Unknown => "An unknown error occurred",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::AlreadyExists => "Resource already exists",
            ErrorCode::InvalidRequest => "Invalid request",
            ErrorCode::RequiredField => "Required field is missing",
            ErrorCode::ValueOutOfRange => "Value is out of range",

            // Auth
            ErrorCode::NotAuthenticated => "User is not authenticated",
            ErrorCode::TokenExpired => "Authentication token has expired",

            // Permission
            ErrorCode::PermissionDenied => "Permission denied",

            // Order
            ErrorCode::StagedOrderNotFound => "Staged order not found",
            ErrorCode::OrderNotFound => "Order not found",
            ErrorCode::LineItemNotFound => "Line item not found",
            ErrorCode::OrderEmpty => "Order is empty",
            ErrorCode::OrderAlreadyFinalized => "Order has already been finalized",
            ErrorCode::OrderStateConflict => "Order was changed by another session",
            ErrorCode::InvalidStatusTransition => "Status transition is not allowed",
            ErrorCode::ReasonRequired => "A reason is required for this action",
            ErrorCode::ProductOutOfStock => "Product is out of stock",

            // Payment
            ErrorCode::PaymentInsufficientAmount => "Insufficient payment amount",
            ErrorCode::PaymentMethodRequired => "Payment method is required",
            ErrorCode::PaymentFailed => "Payment processing failed",

            // Promotion
            ErrorCode::PromotionNotFound => "Promotion code not found",
            ErrorCode::PromotionExpired => "Promotion has expired",
            ErrorCode::PromotionNotYetValid => "Promotion is not active yet",
            ErrorCode::PromotionUsageExhausted => "Promotion usage limit reached",
            ErrorCode::PromotionBelowMinimum => "Order does not reach the promotion minimum",

            // System
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::NetworkError => "Network error",
            ErrorCode::TimeoutError => "Operation timed out",
            ErrorCode::ConfigError => "Configuration error",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error when converting from an invalid u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            0 => Ok(ErrorCode::Success),
            1 => Ok(ErrorCode::Unknown),
            2 => Ok(ErrorCode::ValidationFailed),
            3 => Ok(ErrorCode::NotFound),
            4 => Ok(ErrorCode::AlreadyExists),
            5 => Ok(ErrorCode::InvalidRequest),
            7 => Ok(ErrorCode::RequiredField),
            8 => Ok(ErrorCode::ValueOutOfRange),

            // Auth
            1001 => Ok(ErrorCode::NotAuthenticated),
            1003 => Ok(ErrorCode::TokenExpired),

            // Permission
            2001 => Ok(ErrorCode::PermissionDenied),

            // Order
            4001 => Ok(ErrorCode::StagedOrderNotFound),
            4002 => Ok(ErrorCode::OrderNotFound),
            4003 => Ok(ErrorCode::LineItemNotFound),
            4004 => Ok(ErrorCode::OrderEmpty),
            4005 => Ok(ErrorCode::OrderAlreadyFinalized),
            4006 => Ok(ErrorCode::OrderStateConflict),
            4007 => Ok(ErrorCode::InvalidStatusTransition),
            4008 => Ok(ErrorCode::ReasonRequired),
            4009 => Ok(ErrorCode::ProductOutOfStock),

            // Payment
            5001 => Ok(ErrorCode::PaymentInsufficientAmount),
            5002 => Ok(ErrorCode::PaymentMethodRequired),
            5003 => Ok(ErrorCode::PaymentFailed),

            // Promotion
            6001 => Ok(ErrorCode::PromotionNotFound),
            6002 => Ok(ErrorCode::PromotionExpired),
            6003 => Ok(ErrorCode::PromotionNotYetValid),
            6004 => Ok(ErrorCode::PromotionUsageExhausted),
            6005 => Ok(ErrorCode::PromotionBelowMinimum),

            // System
            9001 => Ok(ErrorCode::InternalError),
            9003 => Ok(ErrorCode::NetworkError),
            9004 => Ok(ErrorCode::TimeoutError),
            9005 => Ok(ErrorCode::ConfigError),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
