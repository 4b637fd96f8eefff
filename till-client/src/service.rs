//! Order service contract

use crate::ClientResult;
use async_trait::async_trait;
use shared::order::{
    FinalizedOrder, OrderType, PromotionResolution, ReceiptSnapshot, StagedOrderCreated,
    StagedOrderPatch, StagedOrderSnapshot, StagedOrderSummary, TransitionRequest,
};

/// Remote order service
///
/// The service is the source of truth for staged and finalized orders.
/// Mutations return nothing; callers pull the recomputed snapshot with
/// [`OrderService::get_staged_order`].
#[async_trait]
pub trait OrderService: Send + Sync {
    /// Create an empty staged order
    async fn create_staged_order(&self, order_type: OrderType) -> ClientResult<StagedOrderCreated>;

    /// Fetch the authoritative snapshot of a staged order
    async fn get_staged_order(&self, order_id: &str) -> ClientResult<StagedOrderSnapshot>;

    /// Add `quantity` units of a variant
    async fn add_line_item(&self, order_id: &str, variant_id: &str, quantity: u32)
    -> ClientResult<()>;

    /// Set the quantity of a variant's line (0 removes it)
    async fn set_line_item_quantity(
        &self,
        order_id: &str,
        variant_id: &str,
        quantity: u32,
    ) -> ClientResult<()>;

    /// Remove a confirmed line item
    async fn remove_line_item(&self, line_id: &str) -> ClientResult<()>;

    /// Partially update a staged order
    async fn update_staged_order(&self, order_id: &str, patch: &StagedOrderPatch)
    -> ClientResult<()>;

    /// Settle payment, turning the staged order into a finalized order
    async fn finalize_payment(&self, order_id: &str) -> ClientResult<ReceiptSnapshot>;

    /// Delete a staged order
    async fn delete_staged_order(&self, order_id: &str) -> ClientResult<()>;

    /// List staged orders that are not finalized yet
    async fn list_staged_orders(&self) -> ClientResult<Vec<StagedOrderSummary>>;

    /// Look up a promotion by code (`ClientError::NotFound` when unknown)
    async fn resolve_promotion(&self, code: &str) -> ClientResult<PromotionResolution>;

    /// Request a named status transition of a finalized order
    async fn transition_order_status(
        &self,
        order_id: &str,
        request: &TransitionRequest,
    ) -> ClientResult<FinalizedOrder>;

    /// Fetch a finalized order
    async fn get_finalized_order(&self, order_id: &str) -> ClientResult<FinalizedOrder>;
}
