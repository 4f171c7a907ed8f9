//! RAII lease over a pooled connection.
//!
//! Release is tied to `Drop`, so exactly one release happens per acquire
//! on every exit path: success, downstream failure, or cancellation of the
//! owning task.

use std::sync::Arc;

use crate::error::CoreError;
use crate::pool::connection::{PooledConnection, Rows};
use crate::pool::pool::PoolShared;

/// Temporary exclusive ownership of one pooled connection.
pub struct ConnectionLease {
    shared: Arc<PoolShared>,
    conn: Option<PooledConnection>,
}

impl ConnectionLease {
    pub(crate) fn new(shared: Arc<PoolShared>, conn: PooledConnection) -> Self {
        Self {
            shared,
            conn: Some(conn),
        }
    }

    /// Id of the leased connection.
    pub fn id(&self) -> u64 {
        self.conn.as_ref().map(|c| c.id()).unwrap_or(u64::MAX)
    }

    /// Execute a query on the leased connection.
    pub async fn execute(
        &mut self,
        query: &str,
        params: &[serde_json::Value],
    ) -> Result<Rows, CoreError> {
        match self.conn.as_mut() {
            Some(conn) => conn.conn.execute(query, params).await,
            None => Err(CoreError::Internal("lease already closed".into())),
        }
    }

    /// Mark the connection broken and close it instead of releasing it.
    ///
    /// Frees the capacity slot; when waiters are queued the pool opens a
    /// replacement on their behalf.
    pub fn invalidate(mut self) {
        if let Some(conn) = self.conn.take() {
            self.shared.invalidate_conn(conn);
        }
    }
}

impl Drop for ConnectionLease {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.shared.hand_back(conn);
        }
    }
}

impl std::fmt::Debug for ConnectionLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionLease")
            .field("conn_id", &self.id())
            .finish()
    }
}
