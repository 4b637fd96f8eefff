//! Till error types
//!
//! Errors fall into four groups, each with its own recovery:
//!
//! | Group | Variants | Recovery |
//! |-------|----------|----------|
//! | Validation | `Validation`, `LineRemoved`, `Busy`, `Finalized`, `TabIndexOutOfRange`, `ReasonRequired`, `TransitionNotAllowed` | nothing was sent |
//! | Not-found / invalid | `InvalidPromotion`, `NotFound` | speculative state cleared |
//! | Conflict | `Conflict` | tab resynced from the server |
//! | Transient | `Transient` | quantity rolled back, coalesced fields kept |
//!
//! `TabClosed` marks a response that arrived after its tab was deleted.

use shared::order::{PromotionRejection, StatusTransition, TransitionRejection};
use thiserror::Error;
use till_client::ClientError;

/// Till error
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PosError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Line item {0} has been removed")]
    LineRemoved(String),

    #[error("Another operation is in progress")]
    Busy,

    #[error("Order has already been finalized")]
    Finalized,

    #[error("Tab index {index} out of range ({len} open)")]
    TabIndexOutOfRange { index: usize, len: usize },

    #[error("{0} requires a reason")]
    ReasonRequired(StatusTransition),

    #[error("Transition not allowed: {0}")]
    TransitionNotAllowed(String),

    #[error("Promotion code {code} is invalid: {reason}")]
    InvalidPromotion {
        code: String,
        reason: PromotionRejection,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Order changed on the server: {0}")]
    Conflict(String),

    #[error("Temporary failure: {0}")]
    Transient(String),

    #[error("Tab has been closed")]
    TabClosed,
}

impl PosError {
    /// Message suitable for the cashier
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::LineRemoved(_) => "This item was removed from the cart.".to_string(),
            Self::Busy => "Please wait for the current update to finish.".to_string(),
            Self::Finalized => "This order has already been paid.".to_string(),
            Self::TabIndexOutOfRange { .. } => "That tab no longer exists.".to_string(),
            Self::ReasonRequired(t) => format!("Please enter a reason to {}.", action_label(*t)),
            Self::TransitionNotAllowed(_) => {
                "This action is not available for the order's current status.".to_string()
            }
            Self::InvalidPromotion { code, reason } => {
                format!("Promotion code \"{}\" cannot be used: {}.", code, reason)
            }
            Self::NotFound(_) => "The order no longer exists.".to_string(),
            Self::Conflict(_) => {
                "The order was changed elsewhere and has been reloaded.".to_string()
            }
            Self::Transient(_) => "Could not reach the server. Please try again.".to_string(),
            Self::TabClosed => "This tab has been closed.".to_string(),
        }
    }

    /// Whether repeating the same operation may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Local precondition failure (nothing was sent)
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::LineRemoved(_)
                | Self::Busy
                | Self::Finalized
                | Self::TabIndexOutOfRange { .. }
                | Self::ReasonRequired(_)
                | Self::TransitionNotAllowed(_)
        )
    }
}

fn action_label(t: StatusTransition) -> &'static str {
    match t {
        StatusTransition::MarkOutOfStock => "mark the order out of stock",
        StatusTransition::Cancel => "cancel the order",
        StatusTransition::RequestReturn => "request a return",
        StatusTransition::RejectReturn => "reject the return",
        StatusTransition::ReturnAtCounter => "return the order",
        _ => "continue",
    }
}

impl From<ClientError> for PosError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::NotFound(e) => Self::NotFound(e.message),
            ClientError::Conflict(e) => Self::Conflict(e.message),
            ClientError::Validation(e) => Self::Validation(e.message),
            ClientError::Unauthorized => Self::Validation("not authorized".to_string()),
            ClientError::Forbidden(msg) => Self::Validation(msg),
            other => Self::Transient(other.to_string()),
        }
    }
}

impl From<TransitionRejection> for PosError {
    fn from(err: TransitionRejection) -> Self {
        match err {
            TransitionRejection::ReasonRequired(t) => Self::ReasonRequired(t),
            other => Self::TransitionNotAllowed(other.to_string()),
        }
    }
}

/// Result type for till operations
pub type PosResult<T> = Result<T, PosError>;
