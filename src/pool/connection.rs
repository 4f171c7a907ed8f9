//! Connection abstractions.
//!
//! The pool owns [`PooledConnection`]s; what they wrap is behind the
//! [`DatabaseConnection`] capability, and how new ones are opened is behind
//! [`Connector`]. The actual wire protocol is an external concern.

use serde::Serialize;
use tokio::time::Instant;

use crate::error::CoreError;
use crate::BoxFuture;

/// Result rows of a database operation, kept protocol-agnostic.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Rows {
    pub rows: Vec<serde_json::Value>,
}

impl Rows {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Minimal outbound database capability: execute a query with parameters.
pub trait DatabaseConnection: Send + 'static {
    fn execute<'a>(
        &'a mut self,
        query: &'a str,
        params: &'a [serde_json::Value],
    ) -> BoxFuture<'a, Result<Rows, CoreError>>;
}

/// Opens new connections for the pool.
///
/// Returned futures are `'static`: implementations clone whatever handles
/// they need so the connect can be driven by the acquiring task.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self) -> BoxFuture<'static, Result<Box<dyn DatabaseConnection>, CoreError>>;
}

/// Lifecycle state of a pooled connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Idle,
    Leased,
    Closed,
}

/// A connection owned by the pool and leased to at most one task at a time.
pub struct PooledConnection {
    pub(crate) id: u64,
    pub(crate) state: ConnState,
    pub(crate) last_used: Instant,
    pub(crate) conn: Box<dyn DatabaseConnection>,
}

impl PooledConnection {
    /// Wrap a freshly opened connection, immediately leased to its opener.
    pub(crate) fn new_leased(id: u64, conn: Box<dyn DatabaseConnection>) -> Self {
        Self {
            id,
            state: ConnState::Leased,
            last_used: Instant::now(),
            conn,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("last_used", &self.last_used)
            .finish_non_exhaustive()
    }
}
