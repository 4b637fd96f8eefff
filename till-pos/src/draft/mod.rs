//! DraftOrder - state machine of one open tab
//!
//! Every mutation follows the same shape:
//!
//! ```text
//! local optimistic change ─► order service call ─► pull snapshot ─► reconcile
//!                                  │
//!                                  └─ failure: rollback / retain / resync
//! ```
//!
//! The local view lives behind a `parking_lot::Mutex` that is never held
//! across an `.await`. Customer and promotion operations are serialized by
//! per-tab async gates; staged-order creation by a third gate so concurrent
//! first mutations share one server record.
//!
//! Gate order is promotion → customer → create. The create gate is never
//! held while acquiring another gate.

mod state;


pub use state::{DraftPhase, DraftView, TabActivity};
pub(crate) use state::{DraftState, PendingAdd};

use crate::coalescer::{CoalescedField, CoalescedSink, EditCoalescer, FlushBatch};
use crate::config::CoalesceWindows;
use crate::error::{PosError, PosResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use shared::order::{
    CustomerRef, LineItem, OrderType, ProductVariant, ReceiptSnapshot, StagedOrderPatch,
    StagedOrderSnapshot,
};
use std::sync::{Arc, Weak};
use till_client::OrderService;
use tokio_util::sync::CancellationToken;

/// Coalesced fields sent through the combined update
const PATCHED_FIELDS: [CoalescedField; 3] = [
    CoalescedField::Note,
    CoalescedField::TenderedCash,
    CoalescedField::PaymentMethod,
];

/// State machine of one tab's staged order
pub struct DraftOrder {
    pub(crate) service: Arc<dyn OrderService>,
    pub(crate) state: Mutex<DraftState>,
    coalescer: EditCoalescer,
    pub(crate) promotion_gate: tokio::sync::Mutex<()>,
    customer_gate: tokio::sync::Mutex<()>,
    create_gate: tokio::sync::Mutex<()>,
    closed: CancellationToken,
    local_id: String,
}

impl std::fmt::Debug for DraftOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DraftOrder")
            .field("local_id", &self.local_id)
            .field("order_id", &self.order_id())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl DraftOrder {
    /// Open a tab with no server record yet
    pub fn new_local(
        service: Arc<dyn OrderService>,
        order_type: OrderType,
        windows: CoalesceWindows,
    ) -> Arc<Self> {
        Self::build(service, DraftState::new(order_type), windows)
    }

    /// Open a tab over an existing staged order
    pub fn from_snapshot(
        service: Arc<dyn OrderService>,
        snapshot: StagedOrderSnapshot,
        windows: CoalesceWindows,
    ) -> Arc<Self> {
        Self::build(service, DraftState::from_snapshot(snapshot), windows)
    }

    fn build(
        service: Arc<dyn OrderService>,
        state: DraftState,
        windows: CoalesceWindows,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<DraftOrder>| {
            let sink: Weak<dyn CoalescedSink> = weak.clone();
            Self {
                service,
                state: Mutex::new(state),
                coalescer: EditCoalescer::spawn(windows, sink),
                promotion_gate: tokio::sync::Mutex::new(()),
                customer_gate: tokio::sync::Mutex::new(()),
                create_gate: tokio::sync::Mutex::new(()),
                closed: CancellationToken::new(),
                local_id: uuid::Uuid::new_v4().to_string(),
            }
        })
    }

    // ========== Accessors ==========

    /// Stable local identifier of the tab
    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// Server identifier, once persisted
    pub fn order_id(&self) -> Option<String> {
        self.state.lock().order_id.clone()
    }

    pub fn is_persisted(&self) -> bool {
        self.state.lock().order_id.is_some()
    }

    pub fn view(&self) -> DraftView {
        self.state.lock().view()
    }

    pub fn phase(&self) -> DraftPhase {
        self.state.lock().phase()
    }

    pub fn activity(&self) -> TabActivity {
        self.state.lock().activity()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Close the tab: stop the coalescer and discard late responses
    pub fn close(&self) {
        self.closed.cancel();
        self.coalescer.shutdown();
    }

    // ========== Guards ==========

    pub(crate) fn ensure_open(&self) -> PosResult<()> {
        if self.closed.is_cancelled() {
            return Err(PosError::TabClosed);
        }
        Ok(())
    }

    /// Precondition of every cashier-initiated mutation
    pub(crate) fn ensure_mutable(&self) -> PosResult<()> {
        self.ensure_open()?;
        let state = self.state.lock();
        if state.finalized {
            return Err(PosError::Finalized);
        }
        if state.finalizing {
            return Err(PosError::Busy);
        }
        Ok(())
    }

    /// Run a server round-trip as a tracked mutation
    pub(crate) async fn track<T, F>(&self, op: F) -> PosResult<T>
    where
        F: std::future::Future<Output = PosResult<T>>,
    {
        self.state.lock().begin_mutation();
        let result = op.await;
        // late responses of a deleted tab are dropped whatever they carried
        let result = if self.closed.is_cancelled() {
            Err(PosError::TabClosed)
        } else {
            result
        };
        self.state.lock().end_mutation(&result);
        result
    }

    // ========== Server sync ==========

    /// Server ID of this tab, creating the staged order on first use
    pub(crate) async fn ensure_persisted(&self) -> PosResult<String> {
        if let Some(id) = self.order_id() {
            return Ok(id);
        }
        let _create = self.create_gate.lock().await;
        let order_type = {
            let state = self.state.lock();
            if let Some(id) = &state.order_id {
                return Ok(id.clone());
            }
            state.order_type
        };

        let created = self.service.create_staged_order(order_type).await?;
        if self.is_closed() {
            // tab deleted while creating: do not leave an orphan behind
            if let Err(e) = self.service.delete_staged_order(&created.id).await {
                tracing::warn!(order_id = %created.id, error = %e, "Failed to delete orphaned staged order");
            }
            return Err(PosError::TabClosed);
        }

        self.state.lock().order_id = Some(created.id.clone());
        tracing::info!(order_id = %created.id, tab = %self.local_id, "Staged order created");
        Ok(created.id)
    }

    /// Pull the authoritative snapshot and reconcile
    pub(crate) async fn pull_snapshot(&self, order_id: &str) -> PosResult<()> {
        let snapshot = self.service.get_staged_order(order_id).await?;
        self.ensure_open()?;
        self.state.lock().apply_snapshot(snapshot);
        Ok(())
    }

    /// Re-read the server record (tab switch, conflict recovery)
    pub async fn refresh(&self) -> PosResult<()> {
        self.ensure_open()?;
        let Some(order_id) = self.order_id() else {
            return Ok(());
        };
        self.pull_snapshot(&order_id).await
    }

    /// Best-effort resync after a conflict
    pub(crate) async fn resync(&self) {
        if let Err(e) = self.refresh().await {
            tracing::warn!(tab = %self.local_id, error = %e, "Resync after conflict failed");
        }
    }

    // ========== Line items ==========

    /// Add one unit of a variant
    ///
    /// The provisional line stays visible until the next authoritative
    /// snapshot, even when the request fails.
    pub async fn add_item(&self, variant: &ProductVariant) -> PosResult<()> {
        if variant.variant_id.trim().is_empty() {
            return Err(PosError::Validation("variant is not resolvable".into()));
        }
        if variant.unit_price < Decimal::ZERO || variant.discounted_unit_price < Decimal::ZERO {
            return Err(PosError::Validation("variant price is negative".into()));
        }
        if !variant.is_in_stock() {
            return Err(PosError::Validation(format!(
                "{} is out of stock",
                variant.name
            )));
        }
        self.ensure_mutable()?;

        let provisional_id = format!("tmp-{}", uuid::Uuid::new_v4());
        let pending = Arc::new(PendingAdd::default());
        {
            let mut state = self.state.lock();
            state
                .items
                .push(LineItem::provisional(provisional_id.clone(), variant));
            state
                .pending_adds
                .insert(provisional_id.clone(), pending.clone());
        }

        let result = {
            let _settle = pending.settle_on_drop();
            self.track(async {
                let order_id = self.ensure_persisted().await?;
                self.service
                    .add_line_item(&order_id, &variant.variant_id, 1)
                    .await?;
                pending.acknowledge();
                self.ensure_open()?;
                self.pull_snapshot(&order_id).await
            })
            .await
        };
        self.state.lock().pending_adds.remove(&provisional_id);

        if let Err(e) = &result {
            tracing::warn!(tab = %self.local_id, variant_id = %variant.variant_id, error = %e, "Add item failed");
            if matches!(e, PosError::Conflict(_)) {
                self.resync().await;
            }
        }
        result
    }

    /// Change a line's quantity; `quantity <= 0` removes the line
    pub async fn set_quantity(&self, line_id: &str, quantity: i64) -> PosResult<()> {
        self.ensure_mutable()?;
        if self.state.lock().tombstones.contains(line_id) {
            return Err(PosError::LineRemoved(line_id.to_string()));
        }
        if quantity <= 0 {
            return self.remove_line(line_id).await;
        }
        let quantity = u32::try_from(quantity)
            .map_err(|_| PosError::Validation("quantity is too large".into()))?;

        let (variant_id, previous, revision) = {
            let mut state = self.state.lock();
            let idx = state
                .line_index(line_id)
                .ok_or_else(|| PosError::NotFound(format!("line item {}", line_id)))?;
            let line = &mut state.items[idx];
            let previous = (line.quantity, line.line_total);
            line.quantity = quantity;
            line.line_total = line.expected_total();
            let variant_id = line.variant_id.clone();
            let revision = state.bump_line_revision(line_id);
            (variant_id, previous, revision)
        };

        let mut acknowledged = false;
        let result = self
            .track(async {
                let order_id = self.ensure_persisted().await?;
                self.service
                    .set_line_item_quantity(&order_id, &variant_id, quantity)
                    .await?;
                acknowledged = true;
                self.ensure_open()?;
                self.pull_snapshot(&order_id).await
            })
            .await;

        match &result {
            Ok(()) => {}
            Err(PosError::TabClosed) => {}
            Err(PosError::Conflict(_)) => self.resync().await,
            // the server holds the new quantity; only the read-back failed
            Err(e) if acknowledged => {
                tracing::warn!(line_id = %line_id, quantity, error = %e, "Quantity saved but snapshot failed, resyncing");
                self.resync().await;
            }
            Err(e) => {
                let mut state = self.state.lock();
                // a newer edit of the same line owns the displayed value
                if state.line_revision(line_id) == revision
                    && let Some(idx) = state.line_index(line_id)
                {
                    let line = &mut state.items[idx];
                    line.quantity = previous.0;
                    line.line_total = previous.1;
                    tracing::warn!(line_id = %line_id, quantity = previous.0, error = %e, "Quantity edit rolled back");
                }
            }
        }
        result
    }

    async fn remove_line(&self, line_id: &str) -> PosResult<()> {
        let (line, position, pending) = {
            let mut state = self.state.lock();
            let idx = state
                .line_index(line_id)
                .ok_or_else(|| PosError::NotFound(format!("line item {}", line_id)))?;
            state.tombstones.insert(line_id.to_string());
            state.bump_line_revision(line_id);
            let pending = state.pending_adds.get(line_id).cloned();
            (state.items.remove(idx), idx, pending)
        };

        let result = self
            .track(async {
                if line.provisional {
                    return self.retract_add(&line.variant_id, pending.as_deref()).await;
                }
                let order_id = self.ensure_persisted().await?;
                self.service.remove_line_item(&line.line_id).await?;
                self.ensure_open()?;
                self.pull_snapshot(&order_id).await
            })
            .await;
        let applied = pending.as_ref().is_some_and(|p| p.is_acknowledged());

        match &result {
            Ok(()) => {
                tracing::debug!(line_id = %line_id, "Line item removed");
            }
            Err(PosError::TabClosed) => {}
            Err(PosError::Conflict(_)) => {
                self.state.lock().tombstones.remove(line_id);
                self.resync().await;
            }
            // the unit already sits on the variant's confirmed line
            Err(e) if line.provisional && applied => {
                tracing::warn!(line_id = %line_id, error = %e, "Provisional line removal failed, resyncing");
                self.resync().await;
            }
            Err(e) => {
                let mut state = self.state.lock();
                state.tombstones.remove(line_id);
                if state.line_index(line_id).is_none() {
                    let at = position.min(state.items.len());
                    state.items.insert(at, line);
                }
                tracing::warn!(line_id = %line_id, error = %e, "Line removal rolled back");
            }
        }
        result
    }

    /// Take back the single unit a provisional line stands for
    ///
    /// Waits for the add behind it. An add the server never applied needs no
    /// request; otherwise the variant's line is decremented by one, so units
    /// confirmed earlier stay on the order.
    async fn retract_add(&self, variant_id: &str, pending: Option<&PendingAdd>) -> PosResult<()> {
        let Some(pending) = pending else {
            return Ok(());
        };
        pending.settled().await;
        self.ensure_open()?;
        if !pending.is_acknowledged() {
            return Ok(());
        }

        let order_id = self.ensure_persisted().await?;
        let current = self.service.get_staged_order(&order_id).await?;
        self.ensure_open()?;
        let Some(quantity) = current
            .items
            .iter()
            .find(|l| l.variant_id == variant_id)
            .map(|l| l.quantity)
        else {
            self.state.lock().apply_snapshot(current);
            return Ok(());
        };

        self.service
            .set_line_item_quantity(&order_id, variant_id, quantity.saturating_sub(1))
            .await?;
        self.ensure_open()?;
        self.pull_snapshot(&order_id).await
    }

    // ========== Customer ==========

    /// Bind or unbind the customer; the local view changes only after the
    /// server acknowledged it
    pub async fn bind_customer(&self, customer: Option<CustomerRef>) -> PosResult<()> {
        self.ensure_mutable()?;
        let _gate = self.customer_gate.lock().await;
        self.ensure_mutable()?;

        let customer_id = customer.as_ref().map(|c| c.id.clone());
        let result = self
            .track(async {
                let order_id = self.ensure_persisted().await?;
                let patch = StagedOrderPatch {
                    customer_id: Some(customer_id.clone()),
                    ..Default::default()
                };
                self.service.update_staged_order(&order_id, &patch).await?;
                self.ensure_open()?;
                self.pull_snapshot(&order_id).await
            })
            .await;

        match &result {
            Ok(()) => tracing::info!(tab = %self.local_id, customer_id = ?customer_id, "Customer bound"),
            Err(PosError::Conflict(_)) => self.resync().await,
            Err(_) => {}
        }
        result
    }

    // ========== Coalesced fields ==========

    pub fn set_note(&self, note: impl Into<String>) -> PosResult<()> {
        self.ensure_mutable()?;
        {
            let mut state = self.state.lock();
            state.note = note.into();
            state.mark_edited(CoalescedField::Note);
        }
        self.coalescer.touch(CoalescedField::Note);
        Ok(())
    }

    pub fn set_tendered_cash(&self, amount: Decimal) -> PosResult<()> {
        if amount < Decimal::ZERO {
            return Err(PosError::Validation("tendered cash cannot be negative".into()));
        }
        self.ensure_mutable()?;
        {
            let mut state = self.state.lock();
            state.tendered_cash = amount;
            state.mark_edited(CoalescedField::TenderedCash);
        }
        self.coalescer.touch(CoalescedField::TenderedCash);
        Ok(())
    }

    pub fn set_payment_method(&self, payment_method_id: Option<String>) -> PosResult<()> {
        self.ensure_mutable()?;
        {
            let mut state = self.state.lock();
            state.payment_method_id = payment_method_id.filter(|id| !id.trim().is_empty());
            state.mark_edited(CoalescedField::PaymentMethod);
        }
        self.coalescer.touch(CoalescedField::PaymentMethod);
        Ok(())
    }

    /// Record a typed promotion code; applied once typing settles
    pub fn set_promotion_code(&self, code: impl Into<String>) -> PosResult<()> {
        self.ensure_mutable()?;
        {
            let mut state = self.state.lock();
            state.promotion_input = code.into();
            state.mark_edited(CoalescedField::PromotionCode);
        }
        self.coalescer.touch(CoalescedField::PromotionCode);
        Ok(())
    }

    /// Send every pending coalesced edit now
    pub async fn flush_pending_edits(&self) -> PosResult<()> {
        self.ensure_mutable()?;
        self.coalescer.flush_now().await
    }

    /// One combined update with the latest local values of `fields`, plus
    /// customer and promotion read from the server just before sending
    async fn send_coalesced(&self, fields: &[CoalescedField]) -> PosResult<()> {
        let order_id = self.ensure_persisted().await?;
        let _promotion = self.promotion_gate.lock().await;
        let _customer = self.customer_gate.lock().await;
        self.ensure_open()?;

        let result = self
            .track(async {
                let current = self.service.get_staged_order(&order_id).await?;
                self.ensure_open()?;

                let (mut patch, sent) = self.state.lock().coalesced_patch(fields);
                patch.customer_id = Some(current.customer.as_ref().map(|c| c.id.clone()));
                patch.promotion_code = Some(current.promotion.as_ref().map(|p| p.code.clone()));

                self.service.update_staged_order(&order_id, &patch).await?;
                self.ensure_open()?;
                {
                    let mut state = self.state.lock();
                    for (field, seq) in sent {
                        state.mark_synced(field, seq);
                    }
                }
                self.pull_snapshot(&order_id).await
            })
            .await;

        match &result {
            Ok(()) => tracing::debug!(order_id = %order_id, ?fields, "Coalesced edits sent"),
            Err(PosError::Conflict(_)) => self.resync().await,
            Err(_) => {}
        }
        result
    }

    // ========== Finalize ==========

    /// Settle payment
    ///
    /// Requires at least one line, a payment method, `tendered_cash >= total`
    /// and no mutation in flight. A failed guard sends nothing. On any later
    /// failure the local view is restored exactly.
    pub async fn finalize(&self, tendered_cash: Decimal) -> PosResult<ReceiptSnapshot> {
        self.ensure_mutable()?;
        let saved = {
            let mut state = self.state.lock();
            Self::check_payable(&state, tendered_cash)?;
            if state.in_flight > 0 {
                return Err(PosError::Busy);
            }
            let saved = state.clone();
            state.finalizing = true;
            if state.tendered_cash != tendered_cash {
                state.tendered_cash = tendered_cash;
                state.mark_edited(CoalescedField::TenderedCash);
            }
            saved
        };

        let result = async {
            self.coalescer.flush_now().await?;
            self.ensure_open()?;
            let order_id = {
                let state = self.state.lock();
                // the flush may have re-priced the order
                Self::check_payable(&state, tendered_cash)?;
                state
                    .order_id
                    .clone()
                    .ok_or_else(|| PosError::Validation("order has not been saved".into()))?
            };
            let receipt = self.service.finalize_payment(&order_id).await?;
            Ok::<_, PosError>((order_id, receipt))
        }
        .await;

        match result {
            Ok((order_id, receipt)) => {
                {
                    let mut state = self.state.lock();
                    state.finalizing = false;
                    state.finalized = true;
                    state.last_error = None;
                }
                self.coalescer.shutdown();
                crate::audit_log!(
                    "finalize",
                    format!("staged_order:{}", order_id),
                    format!("receipt={} total={}", receipt.receipt_number, receipt.total)
                );
                Ok(receipt)
            }
            Err(e) => {
                {
                    let mut state = self.state.lock();
                    let order_id = state.order_id.take();
                    *state = saved;
                    // a record created by the flush stays attached to the tab
                    if state.order_id.is_none() {
                        state.order_id = order_id;
                    }
                    state.last_error = Some(e.user_message());
                }
                tracing::warn!(tab = %self.local_id, error = %e, "Finalize failed, draft restored");
                Err(e)
            }
        }
    }

    fn check_payable(state: &DraftState, tendered_cash: Decimal) -> PosResult<()> {
        if state.items.is_empty() {
            return Err(PosError::Validation("cart is empty".into()));
        }
        if state.payment_method_id.is_none() {
            return Err(PosError::Validation("select a payment method".into()));
        }
        if tendered_cash < state.total {
            return Err(PosError::Validation(format!(
                "tendered cash {} is less than total {}",
                tendered_cash, state.total
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl CoalescedSink for DraftOrder {
    async fn flush(&self, batch: FlushBatch) -> PosResult<()> {
        self.ensure_open()?;
        if self.state.lock().finalized {
            return Ok(());
        }

        // fields still being typed go out when they settle
        let fields: Vec<CoalescedField> = PATCHED_FIELDS
            .into_iter()
            .filter(|f| !batch.is_pending(*f))
            .collect();
        let (send_fields, apply_code) = {
            let state = self.state.lock();
            let dirty = fields.iter().any(|f| state.is_dirty(*f));
            let code = (!batch.is_pending(CoalescedField::PromotionCode)
                && state.is_dirty(CoalescedField::PromotionCode))
            .then(|| state.promotion_input.clone());
            (dirty.then_some(fields), code)
        };

        if let Some(fields) = send_fields {
            self.send_coalesced(&fields).await?;
        }
        if let Some(code) = apply_code {
            match self.apply_promotion_serialized(&code).await {
                Ok(outcome) => tracing::debug!(?outcome, "Typed promotion code applied"),
                // the rejection is visible in the view; a forced flush still succeeds
                Err(e @ PosError::InvalidPromotion { .. }) => {
                    tracing::info!(error = %e, "Typed promotion code rejected");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
