//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Pipeline / pool / scheduler produce:
//!     → sink.rs (ObservabilitySink: spans, metrics, log lines)
//!     → tracing_sink.rs (forward to tracing + metrics facades)
//!     → buffer.rs (bounded queue, drop on saturation)
//!
//! Consumers:
//!     → Log aggregation (stdout, shipper)
//!     → Metrics endpoint (Prometheus scrape)
//!     → Distributed tracing backend
//! ```
//!
//! # Design Decisions
//! - Emission is fire-and-forget: export failure never fails a request
//! - Every event is tagged with the request's ContextCarrier ids
//! - Buffering drops under saturation rather than backpressuring requests
//! - Actual exporters live behind the facades and are external concerns

pub mod buffer;
pub mod metrics;
pub mod sink;
pub mod tracing_sink;

pub use buffer::BufferedSink;
pub use sink::{LogLevel, ObservabilitySink, SpanStatus};
pub use tracing_sink::TracingSink;
