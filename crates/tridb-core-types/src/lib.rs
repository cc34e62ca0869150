//! Core types shared across the triple-store and schema-diff crates.
//!
//! - **Correlation types**: `RequestId`, `TraceId`, `RequestContext`
//! - **Sensitive data**: `Sensitive<T>` marker for automatic redaction
//! - **Schema constants**: canonical field keys and event names for logging

pub mod correlation;
pub mod log_fields;
pub mod sensitive;

pub use correlation::{RequestContext, RequestId, TraceId};
pub use sensitive::Sensitive;
