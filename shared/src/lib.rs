//! Shared types for the till workspace
//!
//! Order service payloads, the error code system and small utilities used
//! by both the HTTP client and the session layer.

pub mod error;
pub mod order;
pub mod util;

// Re-exports
pub use serde::{Deserialize, Serialize};
