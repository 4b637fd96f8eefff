//! Promotion application on a draft
//!
//! ```text
//! apply_promotion(code)
//!     ├─ normalize (trim, upper-case); empty → clear
//!     ├─ take the tab's promotion gate (one application at a time)
//!     ├─ same code already bound → AlreadyApplied, nothing sent
//!     ├─ resolve code                      ── unknown  ─┐
//!     ├─ client pre-filter (window, usage, minimum) ─ fails ─┤
//!     ├─ bind on the server                ── rejected ─┤
//!     └─ pull recomputed totals → Applied               ▼
//!                                         clear local promotion, discount = 0,
//!                                         unbind server-side if one was bound,
//!                                         → InvalidPromotion
//! ```

use crate::coalescer::CoalescedField;
use crate::draft::DraftOrder;
use crate::error::{PosError, PosResult};
use rust_decimal::Decimal;
use shared::order::{Promotion, PromotionRejection, StagedOrderPatch};
use shared::util::now_millis;
use till_client::ClientError;

/// Result of a promotion application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromotionOutcome {
    /// Bound; discount as computed by the server
    Applied { discount: Decimal },
    /// Code was already bound; nothing sent
    AlreadyApplied { discount: Decimal },
    /// Promotion removed (or nothing was bound)
    Cleared,
}

enum ApplyFailure {
    Rejected(PromotionRejection),
    Failed(PosError),
}

impl From<PosError> for ApplyFailure {
    fn from(err: PosError) -> Self {
        Self::Failed(err)
    }
}

impl From<ClientError> for ApplyFailure {
    fn from(err: ClientError) -> Self {
        match err.error_code().and_then(PromotionRejection::from_error_code) {
            Some(rejection) => Self::Rejected(rejection),
            None => Self::Failed(err.into()),
        }
    }
}

/// An unknown code is a rejection only when resolving it
fn resolve_failure(err: ClientError) -> ApplyFailure {
    if err.is_not_found() {
        return ApplyFailure::Rejected(PromotionRejection::NotFound);
    }
    err.into()
}

impl DraftOrder {
    /// Apply a typed promotion code
    pub async fn apply_promotion(&self, code: &str) -> PosResult<PromotionOutcome> {
        self.ensure_mutable()?;
        self.apply_promotion_serialized(code).await
    }

    /// Remove the bound promotion; no-op when none is bound
    pub async fn clear_promotion(&self) -> PosResult<()> {
        self.ensure_mutable()?;
        let _gate = self.promotion_gate.lock().await;
        self.clear_locked().await
    }

    pub(crate) async fn apply_promotion_serialized(&self, code: &str) -> PosResult<PromotionOutcome> {
        let code = Promotion::normalize_code(code);
        let _gate = self.promotion_gate.lock().await;
        self.ensure_open()?;

        if code.is_empty() {
            return self.clear_locked().await.map(|_| PromotionOutcome::Cleared);
        }

        let (input_seq, already) = {
            let mut state = self.state.lock();
            state.promotion_input = code.clone();
            let seq = state.mark_edited(CoalescedField::PromotionCode);
            let already = state
                .promotion
                .as_ref()
                .is_some_and(|p| p.matches_code(&code))
                .then_some(state.discount);
            if already.is_some() {
                state.mark_synced(CoalescedField::PromotionCode, seq);
            }
            (seq, already)
        };
        if let Some(discount) = already {
            tracing::debug!(code = %code, "Promotion already applied");
            return Ok(PromotionOutcome::AlreadyApplied { discount });
        }

        let mut failure = None;
        let result = self
            .track(async {
                match self.bind_promotion(&code).await {
                    Ok(discount) => Ok(discount),
                    Err(ApplyFailure::Failed(e)) => Err(e),
                    Err(ApplyFailure::Rejected(reason)) => {
                        failure = Some(reason);
                        self.invalidate_promotion().await;
                        Err(PosError::InvalidPromotion {
                            code: code.clone(),
                            reason,
                        })
                    }
                }
            })
            .await;

        match result {
            Ok(discount) => {
                self.state
                    .lock()
                    .mark_synced(CoalescedField::PromotionCode, input_seq);
                tracing::info!(code = %code, discount = %discount, "Promotion applied");
                Ok(PromotionOutcome::Applied { discount })
            }
            Err(e) => {
                if let Some(reason) = failure {
                    // the rejection is the server's answer to this input
                    self.state
                        .lock()
                        .mark_synced(CoalescedField::PromotionCode, input_seq);
                    tracing::info!(code = %code, reason = %reason, "Promotion rejected");
                } else if matches!(e, PosError::Conflict(_)) {
                    self.resync().await;
                }
                Err(e)
            }
        }
    }

    /// Resolve, pre-filter and bind; returns the server-computed discount
    async fn bind_promotion(&self, code: &str) -> Result<Decimal, ApplyFailure> {
        let resolution = self
            .service
            .resolve_promotion(code)
            .await
            .map_err(resolve_failure)?;
        self.ensure_open()?;

        let subtotal = self.state.lock().subtotal;
        resolution
            .promotion
            .check_applicability(now_millis(), subtotal)
            .map_err(ApplyFailure::Rejected)?;

        let order_id = self.ensure_persisted().await?;
        let patch = StagedOrderPatch {
            promotion_code: Some(Some(resolution.promotion.code.clone())),
            ..Default::default()
        };
        self.service.update_staged_order(&order_id, &patch).await?;
        self.ensure_open()?;
        self.pull_snapshot(&order_id).await?;

        Ok(self.state.lock().discount)
    }

    /// Drop a rejected promotion locally and, if one was bound, on the server
    async fn invalidate_promotion(&self) {
        let (was_bound, order_id) = {
            let mut state = self.state.lock();
            let was_bound = state.promotion.is_some();
            state.invalidate_promotion();
            (was_bound, state.order_id.clone())
        };
        let (true, Some(order_id)) = (was_bound, order_id) else {
            return;
        };

        let patch = StagedOrderPatch {
            promotion_code: Some(None),
            ..Default::default()
        };
        let unbound = async {
            self.service.update_staged_order(&order_id, &patch).await?;
            self.pull_snapshot(&order_id).await
        }
        .await;
        if let Err(e) = unbound {
            tracing::warn!(order_id = %order_id, error = %e, "Failed to unbind rejected promotion");
        }
    }

    async fn clear_locked(&self) -> PosResult<()> {
        self.ensure_open()?;
        let (order_id, seq) = {
            let mut state = self.state.lock();
            state.promotion_input.clear();
            let seq = state.mark_edited(CoalescedField::PromotionCode);
            if state.promotion.is_none() {
                state.mark_synced(CoalescedField::PromotionCode, seq);
                return Ok(());
            }
            (state.order_id.clone(), seq)
        };
        let Some(order_id) = order_id else {
            let mut state = self.state.lock();
            state.invalidate_promotion();
            state.mark_synced(CoalescedField::PromotionCode, seq);
            return Ok(());
        };

        let result = self
            .track(async {
                let patch = StagedOrderPatch {
                    promotion_code: Some(None),
                    ..Default::default()
                };
                self.service.update_staged_order(&order_id, &patch).await?;
                self.ensure_open()?;
                self.pull_snapshot(&order_id).await
            })
            .await;

        match &result {
            Ok(()) => {
                self.state
                    .lock()
                    .mark_synced(CoalescedField::PromotionCode, seq);
                tracing::info!(order_id = %order_id, "Promotion cleared");
            }
            Err(PosError::Conflict(_)) => self.resync().await,
            Err(_) => {}
        }
        result
    }
}
