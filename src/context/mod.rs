//! Trace context propagation subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request headers
//!     → carrier.rs (extract: parse traceparent/baggage, fallback to fresh)
//!     → pipeline stages carry the ContextCarrier by value
//!     → derive_child() for downstream calls
//!     → inject() into outbound headers / observability events
//! ```
//!
//! # Design Decisions
//! - Explicit parameter passing, never thread-local ambient state
//! - Carriers are immutable; children are new values sharing the trace id
//! - Malformed inbound identifiers never fail a request (fresh fallback)

pub mod carrier;

pub use carrier::{ContextCarrier, SpanId, TraceId};
