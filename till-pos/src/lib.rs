//! Till POS - draft order orchestration for the counter
//!
//! # Module structure
//!
//! ```text
//! till-pos/src/
//! ├── draft/       # DraftOrder: one tab's staged order and its local view
//! ├── promotion    # promotion code application on a draft
//! ├── coalescer    # per-tab debounce of low-urgency field edits
//! ├── tabs/        # TabSessionManager: open tabs, startup reconciliation
//! ├── lifecycle    # status transitions of finalized orders
//! ├── config       # PosConfig from environment
//! ├── logger       # tracing setup, audit log
//! └── error        # PosError
//! ```

pub mod coalescer;
pub mod config;
pub mod draft;
pub mod error;
pub mod lifecycle;
pub mod logger;
pub mod promotion;
pub mod tabs;

#[cfg(test)]
pub(crate) mod testing;

pub use coalescer::{CoalescedField, EditCoalescer};
pub use config::{CoalesceWindows, PosConfig};
pub use draft::{DraftOrder, DraftPhase, DraftView, TabActivity};
pub use error::{PosError, PosResult};
pub use lifecycle::OrderStatusLifecycle;
pub use logger::{cleanup_old_logs, init_logger};
pub use promotion::PromotionOutcome;
pub use tabs::{StartupOutcome, TabSessionManager};
