//! Till Client - order service client
//!
//! [`OrderService`] is the contract the till depends on; [`HttpOrderService`]
//! implements it against the order service REST API.

pub mod config;
pub mod error;
pub mod http;
pub mod service;

pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use http::HttpOrderService;
pub use service::OrderService;

// Re-export shared types for convenience
pub use shared::error::{ApiResponse, AppError, ErrorCode};
