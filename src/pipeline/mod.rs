//! Request-processing pipeline subsystem.
//!
//! # Data Flow
//! ```text
//! inbound request (transport external)
//!     → request.rs (decode, validate)
//!     → context extract (carrier attached, defined in context/)
//!     → pool.acquire (may suspend under backpressure)
//!     → engine.rs (Handler runs the data-access operation on the lease)
//!     → response.rs (encode result or taxonomy error; never fails)
//!     → terminal observability events (span close, latency, log line)
//! ```
//!
//! # Design Decisions
//! - Stage transitions check the request deadline; stages never block
//! - Every acquire has exactly one release, on every exit path
//! - Errors are mapped to the taxonomy at the failing stage, never leaked
//! - Exactly one encoded response per request, cancellation included

pub mod engine;
pub mod request;
pub mod response;
pub mod stage;

pub use engine::{Handler, RequestPipeline};
pub use request::{decode, Method, RawRequest, Request};
pub use response::Response;
pub use stage::Stage;
