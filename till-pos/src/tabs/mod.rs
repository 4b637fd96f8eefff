//! TabSessionManager - the ordered set of open tabs
//!
//! ```text
//! start() ── list staged orders ── fetch each ──┬─ Restored { tabs }
//!                                               └─ NoStagedOrders
//! create_tab()        server record first, then activate
//! open_local_tab()    record created by the first mutation
//! switch_tab(i)       refresh from server, then activate
//! delete_tab(i)       server delete first (if persisted), then close
//! ```
//!
//! Exactly one tab is active while any is open.


use crate::config::CoalesceWindows;
use crate::draft::DraftOrder;
use crate::error::{PosError, PosResult};
use futures::future::join_all;
use rust_decimal::Decimal;
use shared::order::{OrderType, ReceiptSnapshot};
use std::sync::Arc;
use till_client::OrderService;

/// Result of cold-start reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupOutcome {
    /// Tabs rebuilt from staged orders on the server
    Restored { tabs: usize },
    /// Nothing to restore; the caller decides whether to open a first tab
    NoStagedOrders,
}

/// Open tabs of one till
pub struct TabSessionManager {
    service: Arc<dyn OrderService>,
    windows: CoalesceWindows,
    order_type: OrderType,
    tabs: Vec<Arc<DraftOrder>>,
    active: Option<usize>,
}

impl TabSessionManager {
    pub fn new(
        service: Arc<dyn OrderService>,
        order_type: OrderType,
        windows: CoalesceWindows,
    ) -> Self {
        Self {
            service,
            windows,
            order_type,
            tabs: Vec::new(),
            active: None,
        }
    }

    // ========== Accessors ==========

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active
    }

    pub fn active_tab(&self) -> Option<&Arc<DraftOrder>> {
        self.active.and_then(|i| self.tabs.get(i))
    }

    pub fn tab(&self, index: usize) -> PosResult<&Arc<DraftOrder>> {
        self.tabs.get(index).ok_or(PosError::TabIndexOutOfRange {
            index,
            len: self.tabs.len(),
        })
    }

    pub fn tabs(&self) -> &[Arc<DraftOrder>] {
        &self.tabs
    }

    // ========== Lifecycle ==========

    /// Rebuild tabs from the staged orders left on the server
    ///
    /// Orders that disappear between listing and fetching are skipped.
    pub async fn start(&mut self) -> PosResult<StartupOutcome> {
        let summaries = self.service.list_staged_orders().await?;
        tracing::info!(count = summaries.len(), "Staged orders listed");

        let fetches = summaries
            .iter()
            .map(|s| self.service.get_staged_order(&s.id));
        let results = join_all(fetches).await;

        for (summary, result) in summaries.iter().zip(results) {
            match result {
                Ok(snapshot) => {
                    let draft =
                        DraftOrder::from_snapshot(self.service.clone(), snapshot, self.windows);
                    self.tabs.push(draft);
                }
                Err(e) if e.is_not_found() => {
                    tracing::warn!(order_id = %summary.id, "Staged order vanished during startup, skipped");
                }
                Err(e) => {
                    // a partial restore would hide orders from the cashier
                    self.close_all();
                    return Err(e.into());
                }
            }
        }

        if self.tabs.is_empty() {
            tracing::info!("No staged orders to restore");
            return Ok(StartupOutcome::NoStagedOrders);
        }
        self.active = Some(0);
        tracing::info!(tabs = self.tabs.len(), "Tabs restored");
        Ok(StartupOutcome::Restored {
            tabs: self.tabs.len(),
        })
    }

    /// Create a staged order and open it as the active tab
    pub async fn create_tab(&mut self) -> PosResult<Arc<DraftOrder>> {
        let created = self.service.create_staged_order(self.order_type).await?;
        let snapshot = self.service.get_staged_order(&created.id).await?;
        let draft = DraftOrder::from_snapshot(self.service.clone(), snapshot, self.windows);
        tracing::info!(order_id = %created.id, tab = %draft.local_id(), "Tab created");
        Ok(self.push_active(draft))
    }

    /// Open an active tab with no server record yet
    pub fn open_local_tab(&mut self) -> Arc<DraftOrder> {
        let draft = DraftOrder::new_local(self.service.clone(), self.order_type, self.windows);
        tracing::info!(tab = %draft.local_id(), "Local tab opened");
        self.push_active(draft)
    }

    fn push_active(&mut self, draft: Arc<DraftOrder>) -> Arc<DraftOrder> {
        self.tabs.push(draft.clone());
        self.active = Some(self.tabs.len() - 1);
        draft
    }

    /// Make a tab active after refreshing it from the server
    ///
    /// A tab whose staged order was deleted elsewhere is dropped and the
    /// error returned. Any other failure leaves the active tab unchanged.
    pub async fn switch_tab(&mut self, index: usize) -> PosResult<()> {
        let draft = self.tab(index)?.clone();
        match draft.refresh().await {
            Ok(()) => {
                self.active = Some(index);
                tracing::debug!(index, tab = %draft.local_id(), "Tab switched");
                Ok(())
            }
            Err(e @ PosError::NotFound(_)) => {
                tracing::warn!(index, order_id = ?draft.order_id(), "Tab deleted elsewhere, dropped");
                self.remove_at(index);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Close a tab, deleting its staged order first when persisted
    pub async fn delete_tab(&mut self, index: usize) -> PosResult<()> {
        let draft = self.tab(index)?.clone();

        if let Some(order_id) = draft.order_id() {
            match self.service.delete_staged_order(&order_id).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    tracing::debug!(order_id = %order_id, "Staged order already gone");
                }
                Err(e) => {
                    tracing::warn!(order_id = %order_id, error = %e, "Delete failed, tab kept");
                    return Err(e.into());
                }
            }
            crate::audit_log!("delete_tab", format!("staged_order:{}", order_id));
        }

        // the vector may have changed while awaiting
        if let Some(position) = self.position_of(&draft) {
            self.remove_at(position);
        }
        tracing::info!(tab = %draft.local_id(), "Tab deleted");
        Ok(())
    }

    /// Pay a tab; on success it leaves the tab set
    pub async fn finalize_tab(
        &mut self,
        index: usize,
        tendered_cash: Decimal,
    ) -> PosResult<ReceiptSnapshot> {
        let draft = self.tab(index)?.clone();
        let receipt = draft.finalize(tendered_cash).await?;
        if let Some(position) = self.position_of(&draft) {
            self.remove_at(position);
        }
        Ok(receipt)
    }

    fn position_of(&self, draft: &Arc<DraftOrder>) -> Option<usize> {
        self.tabs.iter().position(|t| Arc::ptr_eq(t, draft))
    }

    /// Remove a tab locally and keep the active index valid
    fn remove_at(&mut self, index: usize) {
        let draft = self.tabs.remove(index);
        draft.close();

        self.active = match self.active {
            _ if self.tabs.is_empty() => None,
            Some(active) if index < active => Some(active - 1),
            Some(active) if index == active => Some(index.min(self.tabs.len() - 1)),
            other => other,
        };
    }

    fn close_all(&mut self) {
        for draft in self.tabs.drain(..) {
            draft.close();
        }
        self.active = None;
    }
}

impl Drop for TabSessionManager {
    fn drop(&mut self) {
        self.close_all();
    }
}
