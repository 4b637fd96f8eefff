//! Order Module
//!
//! Types exchanged with the order service:
//! - Staged orders: draft orders being built at the till
//! - Promotions: discount codes and their applicability
//! - Finalized orders: paid orders and their status lifecycle

pub mod promotion;
pub mod snapshot;
pub mod status;
pub mod types;

// Re-exports
pub use promotion::{Promotion, PromotionKind, PromotionRejection, PromotionResolution};
pub use snapshot::{StagedOrderCreated, StagedOrderSnapshot, StagedOrderSummary};
pub use status::{
    FinalizedOrder, OrderStatus, StatusTransition, TransitionRejection, TransitionRequest,
};
pub use types::*;
