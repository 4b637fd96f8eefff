//! In-memory order service for tests
//!
//! Plays the server: recomputes totals, enforces promotion and payment
//! rules, and records every call. Failures and latency can be injected
//! per method.

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use shared::error::{AppError, ErrorCode};
use shared::order::{
    CustomerRef, FinalizedOrder, LineItem, OrderStatus, OrderType, ProductVariant, Promotion,
    PromotionKind, PromotionResolution, ReceiptSnapshot, StagedOrderCreated, StagedOrderPatch,
    StagedOrderSnapshot, StagedOrderSummary, StatusTransition, TransitionRejection,
    TransitionRequest,
};
use shared::util::now_millis;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use till_client::{ClientError, ClientResult, OrderService};

/// Injected failure
#[derive(Debug, Clone, Copy)]
pub enum Failure {
    Transient,
    Conflict,
    NotFound,
    Code(ErrorCode),
}

impl Failure {
    fn into_error(self) -> ClientError {
        match self {
            Self::Transient => ClientError::Server {
                status: 503,
                message: "service unavailable".into(),
            },
            Self::Conflict => ClientError::Conflict(AppError::new(ErrorCode::OrderStateConflict)),
            Self::NotFound => ClientError::NotFound(AppError::new(ErrorCode::StagedOrderNotFound)),
            Self::Code(code) => ClientError::from_app_error(AppError::new(code)),
        }
    }
}

fn reject(code: ErrorCode) -> ClientError {
    ClientError::from_app_error(AppError::new(code))
}

#[derive(Default)]
struct Store {
    staged: Vec<StagedOrderSnapshot>,
    catalog: HashMap<String, ProductVariant>,
    customers: HashMap<String, CustomerRef>,
    promotions: HashMap<String, Promotion>,
    finalized: HashMap<String, FinalizedOrder>,
    /// Status a return request came from, restored on rejection
    return_origin: HashMap<String, OrderStatus>,
    calls: Vec<&'static str>,
    patches: Vec<StagedOrderPatch>,
    failures: HashMap<&'static str, VecDeque<Failure>>,
    delays: HashMap<&'static str, Duration>,
    next_id: u64,
}

impl Store {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn staged_mut(&mut self, order_id: &str) -> ClientResult<&mut StagedOrderSnapshot> {
        self.staged
            .iter_mut()
            .find(|o| o.id == order_id)
            .ok_or_else(|| reject(ErrorCode::StagedOrderNotFound))
    }
}

/// Server-side recomputation of line and order totals
fn recompute(order: &mut StagedOrderSnapshot) {
    for line in &mut order.items {
        line.line_total = line.expected_total();
    }
    order.subtotal = order.items.iter().map(|l| l.line_total).sum();
    order.discount = order
        .promotion
        .as_ref()
        .map(|p| p.preview_discount(order.subtotal))
        .unwrap_or(Decimal::ZERO);
    order.total = (order.subtotal - order.discount).max(Decimal::ZERO);
    order.updated_at = now_millis();
}

fn next_status(
    transition: StatusTransition,
    current: OrderStatus,
    origin: Option<OrderStatus>,
) -> OrderStatus {
    use OrderStatus::*;
    match transition {
        StatusTransition::Confirm => Confirmed,
        StatusTransition::StartPreparing => Preparing,
        StatusTransition::Ship => Shipping,
        StatusTransition::Deliver => Delivered,
        StatusTransition::Complete => Completed,
        StatusTransition::MarkOutOfStock => OutOfStock,
        StatusTransition::Cancel => Cancelled,
        StatusTransition::RequestReturn => ReturnRequested,
        StatusTransition::ConfirmReturn => ReturnConfirmed,
        StatusTransition::RejectReturn => origin.unwrap_or(current),
        StatusTransition::CompleteReturn | StatusTransition::ReturnAtCounter => Returned,
        StatusTransition::MarkPaid => Paid,
    }
}

/// In-memory [`OrderService`]
#[derive(Default)]
pub struct MockOrderService {
    store: Mutex<Store>,
}

impl MockOrderService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    // ========== Fixtures ==========

    pub fn add_variant(&self, variant: ProductVariant) {
        self.store
            .lock()
            .catalog
            .insert(variant.variant_id.clone(), variant);
    }

    pub fn add_customer(&self, customer: CustomerRef) {
        self.store
            .lock()
            .customers
            .insert(customer.id.clone(), customer);
    }

    pub fn add_promotion(&self, promotion: Promotion) {
        self.store
            .lock()
            .promotions
            .insert(Promotion::normalize_code(&promotion.code), promotion);
    }

    /// Insert an existing staged order (totals are recomputed)
    pub fn seed_staged(&self, mut order: StagedOrderSnapshot) {
        recompute(&mut order);
        self.store.lock().staged.push(order);
    }

    pub fn seed_finalized(&self, order: FinalizedOrder) {
        self.store.lock().finalized.insert(order.id.clone(), order);
    }

    // ========== Injection ==========

    /// Fail the next call of `method`
    pub fn fail_next(&self, method: &'static str, failure: Failure) {
        self.store
            .lock()
            .failures
            .entry(method)
            .or_default()
            .push_back(failure);
    }

    /// Delay every call of `method`
    pub fn set_delay(&self, method: &'static str, delay: Duration) {
        self.store.lock().delays.insert(method, delay);
    }

    // ========== Out-of-band changes ==========

    /// Change a staged order as another session would
    pub fn mutate_staged(&self, order_id: &str, f: impl FnOnce(&mut StagedOrderSnapshot)) {
        let mut store = self.store.lock();
        if let Ok(order) = store.staged_mut(order_id) {
            f(order);
            recompute(order);
        }
    }

    pub fn remove_staged(&self, order_id: &str) {
        self.store.lock().staged.retain(|o| o.id != order_id);
    }

    pub fn set_finalized_status(&self, order_id: &str, status: OrderStatus) {
        if let Some(order) = self.store.lock().finalized.get_mut(order_id) {
            order.status = status;
        }
    }

    // ========== Inspection ==========

    pub fn calls(&self) -> Vec<&'static str> {
        self.store.lock().calls.clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.store.lock().calls.iter().filter(|c| **c == method).count()
    }

    /// Every update payload received, in order
    pub fn patches(&self) -> Vec<StagedOrderPatch> {
        self.store.lock().patches.clone()
    }

    pub fn staged(&self, order_id: &str) -> Option<StagedOrderSnapshot> {
        self.store
            .lock()
            .staged
            .iter()
            .find(|o| o.id == order_id)
            .cloned()
    }

    pub fn staged_ids(&self) -> Vec<String> {
        self.store.lock().staged.iter().map(|o| o.id.clone()).collect()
    }

    pub fn finalized(&self, order_id: &str) -> Option<FinalizedOrder> {
        self.store.lock().finalized.get(order_id).cloned()
    }

    /// Record the call, wait the configured delay, then take an injected failure
    async fn enter(&self, method: &'static str) -> ClientResult<()> {
        let delay = {
            let mut store = self.store.lock();
            store.calls.push(method);
            store.delays.get(method).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failure = self
            .store
            .lock()
            .failures
            .get_mut(method)
            .and_then(|q| q.pop_front());
        match failure {
            Some(f) => Err(f.into_error()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl OrderService for MockOrderService {
    async fn create_staged_order(&self, order_type: OrderType) -> ClientResult<StagedOrderCreated> {
        self.enter("create_staged_order").await?;
        let mut store = self.store.lock();
        let id = store.next_id("so");
        store.staged.push(StagedOrderSnapshot::new(id.clone(), order_type));
        Ok(StagedOrderCreated { id })
    }

    async fn get_staged_order(&self, order_id: &str) -> ClientResult<StagedOrderSnapshot> {
        self.enter("get_staged_order").await?;
        self.staged(order_id)
            .ok_or_else(|| reject(ErrorCode::StagedOrderNotFound))
    }

    async fn add_line_item(
        &self,
        order_id: &str,
        variant_id: &str,
        quantity: u32,
    ) -> ClientResult<()> {
        self.enter("add_line_item").await?;
        let mut store = self.store.lock();
        let variant = store
            .catalog
            .get(variant_id)
            .cloned()
            .ok_or_else(|| reject(ErrorCode::NotFound))?;
        let line_id = store.next_id("li");
        let order = store.staged_mut(order_id)?;
        match order.items.iter_mut().find(|l| l.variant_id == variant_id) {
            Some(line) => line.quantity += quantity,
            None => {
                let mut line = LineItem::provisional(line_id, &variant);
                line.provisional = false;
                line.quantity = quantity;
                order.items.push(line);
            }
        }
        recompute(order);
        Ok(())
    }

    async fn set_line_item_quantity(
        &self,
        order_id: &str,
        variant_id: &str,
        quantity: u32,
    ) -> ClientResult<()> {
        self.enter("set_line_item_quantity").await?;
        let mut store = self.store.lock();
        let order = store.staged_mut(order_id)?;
        let idx = order
            .items
            .iter()
            .position(|l| l.variant_id == variant_id)
            .ok_or_else(|| reject(ErrorCode::LineItemNotFound))?;
        if quantity == 0 {
            order.items.remove(idx);
        } else {
            order.items[idx].quantity = quantity;
        }
        recompute(order);
        Ok(())
    }

    async fn remove_line_item(&self, line_id: &str) -> ClientResult<()> {
        self.enter("remove_line_item").await?;
        let mut store = self.store.lock();
        let order = store
            .staged
            .iter_mut()
            .find(|o| o.items.iter().any(|l| l.line_id == line_id))
            .ok_or_else(|| reject(ErrorCode::LineItemNotFound))?;
        order.items.retain(|l| l.line_id != line_id);
        recompute(order);
        Ok(())
    }

    async fn update_staged_order(
        &self,
        order_id: &str,
        patch: &StagedOrderPatch,
    ) -> ClientResult<()> {
        self.enter("update_staged_order").await?;
        let mut store = self.store.lock();
        store.patches.push(patch.clone());

        let customer = match &patch.customer_id {
            Some(Some(id)) => Some(Some(
                store
                    .customers
                    .get(id)
                    .cloned()
                    .ok_or_else(|| reject(ErrorCode::NotFound))?,
            )),
            Some(None) => Some(None),
            None => None,
        };
        let promotion = match &patch.promotion_code {
            Some(Some(code)) => Some(Some(
                store
                    .promotions
                    .get(&Promotion::normalize_code(code))
                    .cloned()
                    .ok_or_else(|| reject(ErrorCode::PromotionNotFound))?,
            )),
            Some(None) => Some(None),
            None => None,
        };

        let order = store.staged_mut(order_id)?;
        if let Some(Some(promotion)) = &promotion {
            let already_bound = order
                .promotion
                .as_ref()
                .is_some_and(|p| p.id == promotion.id);
            if !already_bound {
                promotion
                    .check_applicability(now_millis(), order.subtotal)
                    .map_err(|r| reject(r.error_code()))?;
            }
        }
        if let Some(customer) = customer {
            order.customer = customer;
        }
        if let Some(promotion) = promotion {
            order.promotion = promotion;
        }
        if let Some(method) = &patch.payment_method_id {
            order.payment_method_id = method.clone();
        }
        if let Some(note) = &patch.note {
            order.note = note.clone();
        }
        if let Some(cash) = patch.tendered_cash {
            order.tendered_cash = cash;
        }
        recompute(order);
        Ok(())
    }

    async fn finalize_payment(&self, order_id: &str) -> ClientResult<ReceiptSnapshot> {
        self.enter("finalize_payment").await?;
        let mut store = self.store.lock();
        let order = store.staged_mut(order_id)?.clone();
        if order.items.is_empty() {
            return Err(reject(ErrorCode::OrderEmpty));
        }
        let payment_method_id = order
            .payment_method_id
            .clone()
            .ok_or_else(|| reject(ErrorCode::PaymentMethodRequired))?;
        if order.tendered_cash < order.total {
            return Err(reject(ErrorCode::PaymentInsufficientAmount));
        }

        let now = now_millis();
        let receipt_number = format!("R-{:04}", store.finalized.len() + 1);
        if let Some(p) = &order.promotion
            && let Some(stored) = store.promotions.get_mut(&Promotion::normalize_code(&p.code))
        {
            stored.usage_count += 1;
        }
        store.staged.retain(|o| o.id != order_id);
        store.finalized.insert(
            order.id.clone(),
            FinalizedOrder {
                id: order.id.clone(),
                order_type: order.order_type,
                status: match order.order_type {
                    OrderType::Counter => OrderStatus::Paid,
                    OrderType::Online => OrderStatus::Pending,
                },
                items: order.items.clone(),
                customer: order.customer.clone(),
                promotion: order.promotion.clone(),
                payment_method_id: Some(payment_method_id.clone()),
                subtotal: order.subtotal,
                discount: order.discount,
                total: order.total,
                status_reason: None,
                created_at: now,
                updated_at: now,
            },
        );

        Ok(ReceiptSnapshot {
            order_id: order.id,
            receipt_number,
            order_type: order.order_type,
            items: order.items,
            customer: order.customer,
            promotion: order.promotion,
            payment_method_id,
            subtotal: order.subtotal,
            discount: order.discount,
            total: order.total,
            tendered_cash: order.tendered_cash,
            change_due: order.tendered_cash - order.total,
            finalized_at: now,
        })
    }

    async fn delete_staged_order(&self, order_id: &str) -> ClientResult<()> {
        self.enter("delete_staged_order").await?;
        let mut store = self.store.lock();
        store.staged_mut(order_id)?;
        store.staged.retain(|o| o.id != order_id);
        Ok(())
    }

    async fn list_staged_orders(&self) -> ClientResult<Vec<StagedOrderSummary>> {
        self.enter("list_staged_orders").await?;
        Ok(self.store.lock().staged.iter().map(|o| o.summary()).collect())
    }

    async fn resolve_promotion(&self, code: &str) -> ClientResult<PromotionResolution> {
        self.enter("resolve_promotion").await?;
        let promotion = self
            .store
            .lock()
            .promotions
            .get(&Promotion::normalize_code(code))
            .cloned()
            .ok_or_else(|| reject(ErrorCode::PromotionNotFound))?;
        Ok(PromotionResolution {
            promotion,
            effective_discount_preview: Decimal::ZERO,
        })
    }

    async fn transition_order_status(
        &self,
        order_id: &str,
        request: &TransitionRequest,
    ) -> ClientResult<FinalizedOrder> {
        self.enter("transition_order_status").await?;
        let mut store = self.store.lock();
        let (order_type, current) = store
            .finalized
            .get(order_id)
            .map(|o| (o.order_type, o.status))
            .ok_or_else(|| reject(ErrorCode::OrderNotFound))?;

        request
            .transition
            .check(order_type, current, request.reason.as_deref())
            .map_err(|e| match e {
                TransitionRejection::ReasonRequired(_) => reject(ErrorCode::ReasonRequired),
                _ => reject(ErrorCode::InvalidStatusTransition),
            })?;

        if request.transition == StatusTransition::RequestReturn {
            store.return_origin.insert(order_id.to_string(), current);
        }
        let origin = match request.transition {
            StatusTransition::RejectReturn => store.return_origin.remove(order_id),
            _ => None,
        };

        let order = store
            .finalized
            .get_mut(order_id)
            .ok_or_else(|| reject(ErrorCode::OrderNotFound))?;
        order.status = next_status(request.transition, current, origin);
        if request.reason.is_some() {
            order.status_reason = request.reason.clone();
        }
        order.updated_at = now_millis();
        Ok(order.clone())
    }

    async fn get_finalized_order(&self, order_id: &str) -> ClientResult<FinalizedOrder> {
        self.enter("get_finalized_order").await?;
        self.finalized(order_id)
            .ok_or_else(|| reject(ErrorCode::OrderNotFound))
    }
}

// ========== Fixture builders ==========

pub fn variant(id: &str, name: &str, price: i64) -> ProductVariant {
    ProductVariant {
        variant_id: id.to_string(),
        name: name.to_string(),
        color: None,
        size: None,
        unit_price: Decimal::from(price),
        discounted_unit_price: Decimal::from(price),
        stock: None,
    }
}

pub fn customer(id: &str, name: &str) -> CustomerRef {
    CustomerRef {
        id: id.to_string(),
        name: name.to_string(),
        phone: None,
    }
}

/// Percentage promotion valid from an hour ago for a day
pub fn percentage_promotion(code: &str, percent: i64, cap: Option<i64>) -> Promotion {
    let now = now_millis();
    Promotion {
        id: format!("promo-{}", code.to_lowercase()),
        code: code.to_string(),
        name: code.to_string(),
        kind: PromotionKind::Percentage,
        value: Decimal::from(percent),
        max_discount: cap.map(Decimal::from),
        min_order_value: Decimal::ZERO,
        starts_at: now - 3_600_000,
        ends_at: now + 86_400_000,
        usage_limit: None,
        usage_count: 0,
    }
}

pub fn finalized_order(id: &str, order_type: OrderType, status: OrderStatus) -> FinalizedOrder {
    FinalizedOrder {
        id: id.to_string(),
        order_type,
        status,
        items: Vec::new(),
        customer: None,
        promotion: None,
        payment_method_id: Some("cash".to_string()),
        subtotal: Decimal::from(100),
        discount: Decimal::ZERO,
        total: Decimal::from(100),
        status_reason: None,
        created_at: 0,
        updated_at: 0,
    }
}
