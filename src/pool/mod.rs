//! Bounded database connection pool with backpressure.
//!
//! # Data Flow
//! ```text
//! pipeline stage needs a connection
//!     → pool.rs (acquire: idle LIFO reuse, open if headroom, else wait FIFO)
//!     → lease.rs (RAII lease; release on drop, explicit invalidate)
//!     → connection.rs (Connector opens, DatabaseConnection executes)
//!
//! release with waiters pending
//!     → hand-off directly to the oldest waiter (bypasses the idle queue)
//! ```
//!
//! # Design Decisions
//! - One mutex guards idle/waiters/counts; every mutation is one critical
//!   section, no partial state is observable
//! - Waiters suspend via an explicitly registered Waker, resumed on release
//! - LIFO idle reuse keeps connections warm; FIFO waiters prevent starvation
//! - Idle connections past their TTL are closed before handout, never vended
//! - Exhaustion is reported to the caller, never retried inside the pool

pub mod connection;
pub mod connectors;
pub mod lease;
#[allow(clippy::module_inception)]
pub mod pool;

pub use connection::{ConnState, Connector, DatabaseConnection, PooledConnection, Rows};
pub use connectors::InMemoryConnector;
pub use lease::ConnectionLease;
pub use pool::{Acquire, ConnectionPool, PoolStats};
