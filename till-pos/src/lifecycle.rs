//! OrderStatusLifecycle - guarded status transitions of a paid order
//!
//! The guard table lives in [`StatusTransition`]; this type checks it
//! locally, requests the named transition and adopts whatever the server
//! returns. The next status is never computed here.

use crate::error::{PosError, PosResult};
use shared::order::{FinalizedOrder, OrderStatus, StatusTransition, TransitionRequest};
use std::sync::Arc;
use till_client::OrderService;

/// Status lifecycle of one finalized order
pub struct OrderStatusLifecycle {
    service: Arc<dyn OrderService>,
    order: FinalizedOrder,
}

impl OrderStatusLifecycle {
    pub fn new(service: Arc<dyn OrderService>, order: FinalizedOrder) -> Self {
        Self { service, order }
    }

    /// Fetch a finalized order and wrap it
    pub async fn load(service: Arc<dyn OrderService>, order_id: &str) -> PosResult<Self> {
        let order = service.get_finalized_order(order_id).await?;
        Ok(Self::new(service, order))
    }

    pub fn order(&self) -> &FinalizedOrder {
        &self.order
    }

    pub fn status(&self) -> OrderStatus {
        self.order.status
    }

    /// Transitions to offer for the current status
    pub fn available_transitions(&self) -> Vec<StatusTransition> {
        StatusTransition::available_for(self.order.order_type, self.order.status)
    }

    /// Request a transition
    ///
    /// Guard and reason are checked locally first; a failed check sends
    /// nothing. On a conflict the order is reloaded before the error is
    /// returned.
    pub async fn transition(
        &mut self,
        transition: StatusTransition,
        reason: Option<&str>,
    ) -> PosResult<OrderStatus> {
        let reason = reason.map(str::trim).filter(|r| !r.is_empty());
        transition.check(self.order.order_type, self.order.status, reason)?;

        let request = TransitionRequest {
            transition,
            reason: reason.map(str::to_string),
        };
        let from = self.order.status;
        match self
            .service
            .transition_order_status(&self.order.id, &request)
            .await
        {
            Ok(order) => {
                self.order = order;
                crate::audit_log!(
                    "status_transition",
                    format!("order:{}", self.order.id),
                    format!(
                        "{} {} -> {} reason={}",
                        transition,
                        from,
                        self.order.status,
                        reason.unwrap_or("-")
                    )
                );
                Ok(self.order.status)
            }
            Err(e) if e.is_conflict() => {
                tracing::warn!(order_id = %self.order.id, %transition, error = %e, "Transition conflict, reloading order");
                if let Err(reload) = self.reload().await {
                    tracing::warn!(order_id = %self.order.id, error = %reload, "Reload after conflict failed");
                }
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Re-read the order from the server
    pub async fn reload(&mut self) -> PosResult<()> {
        self.order = self.service.get_finalized_order(&self.order.id).await?;
        Ok(())
    }
}

impl std::fmt::Debug for OrderStatusLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderStatusLifecycle")
            .field("order_id", &self.order.id)
            .field("status", &self.order.status)
            .finish()
    }
}
