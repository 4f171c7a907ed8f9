//! Non-blocking request-processing core.
//!
//! Executes inbound requests without blocking a worker thread on I/O,
//! carries an explicit trace context across every asynchronous hop, and
//! bounds database concurrency with a backpressured connection pool.

use std::future::Future;
use std::pin::Pin;

// Core subsystems
pub mod context;
pub mod pipeline;
pub mod pool;
pub mod scheduler;

// Cross-cutting concerns
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod observability;

/// Boxed future alias used at the crate's trait seams.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub use config::CoreConfig;
pub use context::ContextCarrier;
pub use error::CoreError;
pub use lifecycle::Shutdown;
pub use pipeline::{Handler, RequestPipeline};
pub use pool::ConnectionPool;
pub use scheduler::Scheduler;
