//! Local view of one draft order and its reconciliation rules

use crate::coalescer::CoalescedField;
use rust_decimal::Decimal;
use serde::Serialize;
use shared::order::{
    CustomerRef, LineItem, OrderType, Promotion, StagedOrderPatch, StagedOrderSnapshot,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::{CancellationToken, DropGuard};

/// Lifecycle phase of a draft
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftPhase {
    /// No line items
    Empty,
    /// At least one line item
    Populated,
    /// Payment is being settled
    AwaitingPayment,
    /// Paid; no further edits
    Finalized,
}

/// What the tab is doing right now
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TabActivity {
    Idle,
    Mutating { in_flight: u32 },
    AwaitingPayment,
    Error { message: String },
}

/// Read-only copy of a draft's local view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DraftView {
    pub order_id: Option<String>,
    pub order_type: OrderType,
    pub items: Vec<LineItem>,
    pub customer: Option<CustomerRef>,
    pub promotion: Option<Promotion>,
    pub payment_method_id: Option<String>,
    pub note: String,
    pub tendered_cash: Decimal,
    /// Promotion code as typed, possibly not applied yet
    pub promotion_input: String,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub phase: DraftPhase,
    pub activity: TabActivity,
}

impl DraftView {
    /// Line by ID
    pub fn line(&self, line_id: &str) -> Option<&LineItem> {
        self.items.iter().find(|l| l.line_id == line_id)
    }

    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|l| l.quantity).sum()
    }
}

/// An `add_line_item` request behind a provisional line
#[derive(Debug, Default)]
pub(crate) struct PendingAdd {
    settled: CancellationToken,
    acknowledged: AtomicBool,
}

impl PendingAdd {
    /// Wait until the request has returned, successfully or not
    pub async fn settled(&self) {
        self.settled.cancelled().await;
    }

    /// Settles when dropped, including when the add is abandoned
    pub fn settle_on_drop(&self) -> DropGuard {
        self.settled.clone().drop_guard()
    }

    /// The server applied the add
    pub fn acknowledge(&self) {
        self.acknowledged.store(true, Ordering::Release);
    }

    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged.load(Ordering::Acquire)
    }
}

/// Mutable draft state, guarded by the draft's mutex
#[derive(Debug, Clone)]
pub(crate) struct DraftState {
    pub order_id: Option<String>,
    pub order_type: OrderType,
    pub items: Vec<LineItem>,
    pub customer: Option<CustomerRef>,
    pub promotion: Option<Promotion>,
    pub payment_method_id: Option<String>,
    pub note: String,
    pub tendered_cash: Decimal,
    pub promotion_input: String,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub updated_at: Option<i64>,

    pub finalized: bool,
    pub finalizing: bool,
    pub in_flight: u32,
    pub last_error: Option<String>,

    /// Line IDs deleted locally; never shown again unless the delete failed
    pub tombstones: HashSet<String>,
    /// Revision per line, bumped on every optimistic quantity edit
    pub line_revisions: HashMap<String, u64>,
    /// Unsettled adds, keyed by provisional line ID
    pub pending_adds: HashMap<String, Arc<PendingAdd>>,
    /// Latest local edit per coalesced field
    pub edit_seq: HashMap<CoalescedField, u64>,
    /// Latest edit acknowledged by the server per coalesced field
    pub synced_seq: HashMap<CoalescedField, u64>,
    seq: u64,
}

impl DraftState {
    pub fn new(order_type: OrderType) -> Self {
        Self {
            order_id: None,
            order_type,
            items: Vec::new(),
            customer: None,
            promotion: None,
            payment_method_id: None,
            note: String::new(),
            tendered_cash: Decimal::ZERO,
            promotion_input: String::new(),
            subtotal: Decimal::ZERO,
            discount: Decimal::ZERO,
            total: Decimal::ZERO,
            updated_at: None,
            finalized: false,
            finalizing: false,
            in_flight: 0,
            last_error: None,
            tombstones: HashSet::new(),
            line_revisions: HashMap::new(),
            pending_adds: HashMap::new(),
            edit_seq: HashMap::new(),
            synced_seq: HashMap::new(),
            seq: 0,
        }
    }

    pub fn from_snapshot(snapshot: StagedOrderSnapshot) -> Self {
        let mut state = Self::new(snapshot.order_type);
        state.order_id = Some(snapshot.id.clone());
        state.apply_snapshot(snapshot);
        state
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    pub fn phase(&self) -> DraftPhase {
        if self.finalized {
            DraftPhase::Finalized
        } else if self.finalizing {
            DraftPhase::AwaitingPayment
        } else if self.items.is_empty() {
            DraftPhase::Empty
        } else {
            DraftPhase::Populated
        }
    }

    pub fn activity(&self) -> TabActivity {
        if self.finalizing {
            TabActivity::AwaitingPayment
        } else if self.in_flight > 0 {
            TabActivity::Mutating {
                in_flight: self.in_flight,
            }
        } else if let Some(message) = &self.last_error {
            TabActivity::Error {
                message: message.clone(),
            }
        } else {
            TabActivity::Idle
        }
    }

    pub fn view(&self) -> DraftView {
        DraftView {
            order_id: self.order_id.clone(),
            order_type: self.order_type,
            items: self.items.clone(),
            customer: self.customer.clone(),
            promotion: self.promotion.clone(),
            payment_method_id: self.payment_method_id.clone(),
            note: self.note.clone(),
            tendered_cash: self.tendered_cash,
            promotion_input: self.promotion_input.clone(),
            subtotal: self.subtotal,
            discount: self.discount,
            total: self.total,
            phase: self.phase(),
            activity: self.activity(),
        }
    }

    // ========== Activity ==========

    pub fn begin_mutation(&mut self) {
        self.in_flight += 1;
    }

    pub fn end_mutation<T>(&mut self, result: &Result<T, crate::PosError>) {
        self.in_flight = self.in_flight.saturating_sub(1);
        match result {
            Ok(_) => self.last_error = None,
            Err(e) => self.last_error = Some(e.user_message()),
        }
    }

    // ========== Coalesced fields ==========

    /// Record a local edit of a coalesced field
    pub fn mark_edited(&mut self, field: CoalescedField) -> u64 {
        let seq = self.next_seq();
        self.edit_seq.insert(field, seq);
        seq
    }

    pub fn edit_of(&self, field: CoalescedField) -> u64 {
        self.edit_seq.get(&field).copied().unwrap_or(0)
    }

    /// Local edit not yet acknowledged by the server
    pub fn is_dirty(&self, field: CoalescedField) -> bool {
        self.edit_of(field) > self.synced_seq.get(&field).copied().unwrap_or(0)
    }

    pub fn mark_synced(&mut self, field: CoalescedField, seq: u64) {
        let synced = self.synced_seq.entry(field).or_insert(0);
        *synced = (*synced).max(seq);
    }

    /// Patch carrying the current local values of the given fields,
    /// plus the edit sequence each value corresponds to
    pub fn coalesced_patch(
        &self,
        fields: &[CoalescedField],
    ) -> (StagedOrderPatch, Vec<(CoalescedField, u64)>) {
        let mut patch = StagedOrderPatch::default();
        let mut sent = Vec::new();
        for field in fields {
            match field {
                CoalescedField::Note => patch.note = Some(self.note.clone()),
                CoalescedField::TenderedCash => patch.tendered_cash = Some(self.tendered_cash),
                CoalescedField::PaymentMethod => {
                    patch.payment_method_id = Some(self.payment_method_id.clone())
                }
                // applied through the promotion protocol, never patched directly
                CoalescedField::PromotionCode => continue,
            }
            sent.push((*field, self.edit_of(*field)));
        }
        (patch, sent)
    }

    // ========== Reconciliation ==========

    /// Replace the local view with an authoritative snapshot.
    ///
    /// Coalesced fields with an unacknowledged local edit keep their local
    /// value; tombstoned lines stay hidden.
    pub fn apply_snapshot(&mut self, snapshot: StagedOrderSnapshot) {
        let tombstones = &self.tombstones;
        self.items = snapshot
            .items
            .into_iter()
            .filter(|l| !tombstones.contains(&l.line_id))
            .collect();
        self.order_type = snapshot.order_type;
        self.customer = snapshot.customer;
        self.subtotal = snapshot.subtotal;
        self.discount = snapshot.discount;
        self.total = snapshot.total;
        self.updated_at = Some(snapshot.updated_at);

        if !self.is_dirty(CoalescedField::Note) {
            self.note = snapshot.note;
        }
        if !self.is_dirty(CoalescedField::TenderedCash) {
            self.tendered_cash = snapshot.tendered_cash;
        }
        if !self.is_dirty(CoalescedField::PaymentMethod) {
            self.payment_method_id = snapshot.payment_method_id;
        }
        if !self.is_dirty(CoalescedField::PromotionCode) {
            self.promotion_input = snapshot
                .promotion
                .as_ref()
                .map(|p| p.code.clone())
                .unwrap_or_default();
        }
        self.promotion = snapshot.promotion;
    }

    /// Drop the local promotion after a rejected code
    pub fn invalidate_promotion(&mut self) {
        self.promotion = None;
        self.discount = Decimal::ZERO;
        self.total = self.subtotal.max(Decimal::ZERO);
    }

    // ========== Lines ==========

    pub fn line_index(&self, line_id: &str) -> Option<usize> {
        self.items.iter().position(|l| l.line_id == line_id)
    }

    pub fn bump_line_revision(&mut self, line_id: &str) -> u64 {
        let seq = self.next_seq();
        self.line_revisions.insert(line_id.to_string(), seq);
        seq
    }

    pub fn line_revision(&self, line_id: &str) -> u64 {
        self.line_revisions.get(line_id).copied().unwrap_or(0)
    }
}
