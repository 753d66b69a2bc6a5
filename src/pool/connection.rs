use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::{ConnectionHandle, PoolShared};
use crate::bulk::run_bulk;
use crate::error::ExecError;
use crate::executor::run_statement;
use crate::query::Query;
use crate::results::ResultRow;
use crate::session::{ConnectionState, HandleId, Session};

/// A handle borrowed from a [`Pool`](super::Pool).
///
/// Returned to its pool on [`release`](Self::release) or drop. A handle whose
/// statement was abandoned (timed out or its future dropped) stays tainted: it
/// refuses further statements and is reset before it is lent again.
pub struct PooledConnection<S: Session + 'static> {
    pub(crate) pool: Arc<PoolShared<S>>,
    id: HandleId,
    handle: Option<ConnectionHandle<S>>,
    in_flight: bool,
}

impl<S: Session + 'static> PooledConnection<S> {
    pub(crate) fn new(pool: Arc<PoolShared<S>>, handle: ConnectionHandle<S>) -> Self {
        Self {
            pool,
            id: handle.id,
            handle: Some(handle),
            in_flight: false,
        }
    }

    #[must_use]
    pub fn id(&self) -> HandleId {
        self.id
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.handle
            .as_ref()
            .map_or(ConnectionState::Disconnected, |handle| handle.session.state())
    }

    /// True when a statement on this handle never settled.
    #[must_use]
    pub fn is_tainted(&self) -> bool {
        self.in_flight
    }

    /// Run one statement on this handle.
    ///
    /// # Errors
    /// Returns the first error the statement produced, or `ExecError::Protocol`
    /// if an earlier statement on this handle was abandoned.
    pub async fn execute(&mut self, query: &Query) -> Result<Vec<ResultRow>, ExecError> {
        if self.in_flight {
            return Err(abandoned());
        }
        let Some(handle) = self.handle.as_mut() else {
            return Err(returned());
        };
        self.in_flight = true;
        let result = run_statement(&mut handle.session, query).await;
        self.in_flight = false;
        result
    }

    /// Like [`execute`](Self::execute), giving up after `limit`.
    ///
    /// A timed-out handle is marked tainted and reset when released.
    ///
    /// # Errors
    /// Returns `ExecError::Timeout` when `limit` elapses first.
    pub async fn execute_timeout(
        &mut self,
        query: &Query,
        limit: Duration,
    ) -> Result<Vec<ResultRow>, ExecError> {
        if let Ok(result) = tokio::time::timeout(limit, self.execute(query)).await {
            result
        } else {
            tracing::warn!(handle = %self.id, timeout = ?limit, "statement abandoned after timeout");
            Err(ExecError::Timeout(limit))
        }
    }

    /// Run statements in order on this handle, stopping at the first failure.
    ///
    /// # Errors
    /// Returns the first statement error.
    pub async fn execute_bulk(&mut self, queries: &[Query]) -> Result<(), ExecError> {
        if self.in_flight {
            return Err(abandoned());
        }
        let Some(handle) = self.handle.as_mut() else {
            return Err(returned());
        };
        self.in_flight = true;
        let result = run_bulk(&mut handle.session, queries).await;
        self.in_flight = false;
        result
    }

    /// Give the handle back to its pool.
    pub fn release(mut self) {
        self.check_in();
    }

    fn check_in(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.pool.check_in(handle, self.in_flight);
        }
    }
}

fn abandoned() -> ExecError {
    ExecError::Protocol(
        "an earlier statement on this connection was abandoned; release it".to_string(),
    )
}

fn returned() -> ExecError {
    ExecError::Protocol("connection was already returned to its pool".to_string())
}

impl<S: Session + 'static> Drop for PooledConnection<S> {
    fn drop(&mut self) {
        self.check_in();
    }
}

impl<S: Session + 'static> fmt::Debug for PooledConnection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("pool", &self.pool.id)
            .field("id", &self.id)
            .field("state", &self.state())
            .field("tainted", &self.in_flight)
            .finish()
    }
}
