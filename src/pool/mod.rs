//! Fixed-size pool of eagerly connected sessions.
//!
//! Every handle is connected when the pool is created. Callers borrow a handle
//! with [`Pool::acquire`], which never waits: an empty pool is an error. A
//! handle the peer closed while idle is pulled out and reset in the
//! background; one that comes back broken from a caller is reset on release.
//! Recovery retries until it succeeds or the pool closes, so the pool never
//! shrinks.

mod connection;
mod recovery;
pub mod types;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

pub use connection::PooledConnection;
pub use types::PoolStatus;
pub(crate) use types::ConnectionHandle;

use crate::config::{Config, PoolConfig, RecoveryPolicy};
use crate::error::{ExecError, PoolError};
use crate::executor::QueryTarget;
use crate::helpers::lock;
use crate::query::Query;
use crate::results::ResultRow;
use crate::session::{ConnectionState, Connector, DisconnectNotifier, HandleId, Session};

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// A fixed set of sessions lent out one caller at a time.
///
/// Cloning is cheap; clones share the same handles.
pub struct Pool<S: Session + 'static> {
    shared: Arc<PoolShared<S>>,
}

pub(crate) struct PoolShared<S> {
    pub(crate) id: u64,
    capacity: usize,
    recovery: RecoveryPolicy,
    runtime: Handle,
    slots: Mutex<Slots<S>>,
}

struct Slots<S> {
    available: Vec<ConnectionHandle<S>>,
    // every handle not yet closed, keyed by id
    states: HashMap<HandleId, ConnectionState>,
    closed: bool,
}

impl<S: Session + 'static> Clone for Pool<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: Session + 'static> fmt::Debug for Pool<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("id", &self.shared.id)
            .field("status", &self.status())
            .finish()
    }
}

impl<S: Session + 'static> Pool<S> {
    /// Create the pool and connect every handle, one after another.
    ///
    /// Must be called from inside a tokio runtime; background recovery runs on it.
    ///
    /// # Errors
    /// Returns `PoolError::Configuration` for invalid settings, or
    /// `PoolError::Initialization` naming the first handle that failed to
    /// connect. Handles already connected are closed before returning.
    pub async fn initialize<C>(
        connector: &C,
        config: &Config,
        pool_config: PoolConfig,
    ) -> Result<Self, PoolError>
    where
        C: Connector<Session = S>,
    {
        pool_config.validate()?;
        config
            .validate()
            .map_err(|e| PoolError::Configuration(e.to_string()))?;
        let runtime = Handle::try_current().map_err(|e| {
            PoolError::Configuration(format!("pool requires a tokio runtime: {e}"))
        })?;

        let (disconnect_tx, disconnect_rx) = mpsc::unbounded_channel();
        let mut handles: Vec<ConnectionHandle<S>> = Vec::with_capacity(pool_config.size);
        for index in 0..pool_config.size {
            let id = HandleId(u64::try_from(index).unwrap_or(u64::MAX));
            let mut session = connector.session(config);
            session.set_disconnect_notifier(DisconnectNotifier::new(id, disconnect_tx.clone()));

            if let Err(source) = session.connect().await {
                tracing::warn!(
                    index,
                    server = %config.server,
                    error = %source,
                    "pool initialization failed; closing connected handles"
                );
                session.close().await;
                for mut handle in handles {
                    handle.session.close().await;
                }
                return Err(PoolError::Initialization { index, source });
            }
            tracing::debug!(handle = %id, "pooled connection established");
            handles.push(ConnectionHandle { id, session });
        }
        drop(disconnect_tx);

        let states = handles
            .iter()
            .map(|handle| (handle.id, ConnectionState::Connected))
            .collect();
        let shared = Arc::new(PoolShared {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            capacity: pool_config.size,
            recovery: pool_config.recovery,
            runtime: runtime.clone(),
            slots: Mutex::new(Slots {
                available: handles,
                states,
                closed: false,
            }),
        });
        runtime.spawn(recovery::watch_disconnects(
            Arc::downgrade(&shared),
            disconnect_rx,
        ));

        tracing::info!(
            pool = shared.id,
            size = pool_config.size,
            server = %config.server,
            "connection pool created"
        );
        Ok(Self { shared })
    }

    /// Borrow an idle handle. Never waits.
    ///
    /// # Errors
    /// Returns `PoolError::Closed` after [`close`](Self::close) and
    /// `PoolError::Exhausted` when no handle is idle.
    pub fn acquire(&self) -> Result<PooledConnection<S>, PoolError> {
        let mut stale = Vec::new();
        let acquired = {
            let mut slots = lock(&self.shared.slots);
            if slots.closed {
                return Err(PoolError::Closed);
            }
            let mut acquired = None;
            while let Some(handle) = slots.available.pop() {
                // peer closed it and the watcher has not caught up yet, or a
                // statement never settled
                if handle.session.state() != ConnectionState::Connected {
                    slots.states.insert(handle.id, ConnectionState::Disconnected);
                    stale.push(handle);
                    continue;
                }
                slots.states.insert(handle.id, ConnectionState::Busy);
                acquired = Some(handle);
                break;
            }
            acquired
        };

        for handle in stale {
            self.shared.spawn_recovery(handle);
        }

        match acquired {
            Some(handle) => {
                tracing::trace!(pool = self.shared.id, handle = %handle.id, "connection acquired");
                Ok(PooledConnection::new(Arc::clone(&self.shared), handle))
            }
            None => {
                tracing::debug!(
                    pool = self.shared.id,
                    capacity = self.shared.capacity,
                    "connection pool exhausted"
                );
                Err(PoolError::Exhausted {
                    capacity: self.shared.capacity,
                })
            }
        }
    }

    /// Return a borrowed handle.
    ///
    /// Equivalent to dropping it, except that a handle from another pool is
    /// rejected here (and then goes back to its own pool).
    ///
    /// # Errors
    /// Returns `PoolError::ForeignConnection` if `conn` came from a different pool.
    pub fn release(&self, conn: PooledConnection<S>) -> Result<(), PoolError> {
        if !Arc::ptr_eq(&conn.pool, &self.shared) {
            return Err(PoolError::ForeignConnection);
        }
        conn.release();
        Ok(())
    }

    /// Close every idle handle concurrently and stop lending.
    ///
    /// Handles still borrowed, or recovering, are closed when they come back.
    /// Calling this twice is a no-op.
    pub async fn close(&self) {
        let idle = {
            let mut slots = lock(&self.shared.slots);
            if slots.closed {
                return;
            }
            slots.closed = true;
            let idle: Vec<_> = slots.available.drain(..).collect();
            for handle in &idle {
                slots.states.remove(&handle.id);
            }
            idle
        };

        let count = idle.len();
        join_all(idle.into_iter().map(|mut handle| async move {
            handle.session.close().await;
        }))
        .await;
        tracing::info!(pool = self.shared.id, closed = count, "connection pool closed");
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let slots = lock(&self.shared.slots);
        let mut status = PoolStatus {
            capacity: self.shared.capacity,
            available: slots.available.len(),
            ..PoolStatus::default()
        };
        for state in slots.states.values() {
            match state {
                ConnectionState::Busy => status.in_use += 1,
                ConnectionState::Disconnected | ConnectionState::Connecting => {
                    status.recovering += 1;
                }
                ConnectionState::Connected => {}
            }
        }
        status
    }
}

impl<S: Session + 'static> PoolShared<S> {
    fn is_closed(&self) -> bool {
        lock(&self.slots).closed
    }

    /// Take back a handle from a caller. `tainted` means a statement was
    /// abandoned mid-flight. Anything not cleanly `Connected` is recovered.
    pub(crate) fn check_in(self: &Arc<Self>, handle: ConnectionHandle<S>, tainted: bool) {
        let id = handle.id;
        let mut slots = lock(&self.slots);
        if slots.closed {
            slots.states.remove(&id);
            drop(slots);
            self.spawn_close(handle);
            return;
        }

        let state = handle.session.state();
        if tainted || state != ConnectionState::Connected {
            slots.states.insert(id, ConnectionState::Disconnected);
            drop(slots);
            tracing::warn!(
                pool = self.id,
                handle = %id,
                tainted,
                ?state,
                "returned connection needs recovery"
            );
            self.spawn_recovery(handle);
        } else {
            slots.states.insert(id, ConnectionState::Connected);
            slots.available.push(handle);
            tracing::trace!(pool = self.id, handle = %id, "connection released");
        }
    }

    /// React to a peer close reported by a session. Only idle handles are
    /// touched; a borrowed one is checked when it is returned.
    fn on_disconnect(self: &Arc<Self>, id: HandleId) {
        let mut slots = lock(&self.slots);
        if slots.closed {
            return;
        }
        let Some(pos) = slots.available.iter().position(|handle| {
            handle.id == id && handle.session.state() == ConnectionState::Disconnected
        }) else {
            return;
        };
        let handle = slots.available.swap_remove(pos);
        slots.states.insert(id, ConnectionState::Disconnected);
        drop(slots);

        tracing::warn!(pool = self.id, handle = %id, "idle connection closed by peer; recovering");
        self.spawn_recovery(handle);
    }

    /// Put a recovered handle back into circulation.
    fn restore(self: &Arc<Self>, handle: ConnectionHandle<S>) {
        let mut slots = lock(&self.slots);
        if slots.closed {
            slots.states.remove(&handle.id);
            drop(slots);
            self.spawn_close(handle);
            return;
        }
        slots.states.insert(handle.id, ConnectionState::Connected);
        slots.available.push(handle);
    }

    fn forget(&self, id: HandleId) {
        lock(&self.slots).states.remove(&id);
    }

    fn spawn_recovery(self: &Arc<Self>, handle: ConnectionHandle<S>) {
        self.runtime
            .spawn(recovery::recover(Arc::clone(self), handle));
    }

    fn spawn_close(&self, mut handle: ConnectionHandle<S>) {
        let pool = self.id;
        self.runtime.spawn(async move {
            handle.session.close().await;
            tracing::debug!(pool, handle = %handle.id, "connection closed after pool shutdown");
        });
    }
}

#[async_trait]
impl<S: Session + 'static> QueryTarget for Pool<S> {
    async fn execute(&self, query: &Query) -> Result<Vec<ResultRow>, ExecError> {
        let mut conn = self.acquire()?;
        conn.execute(query).await
    }

    async fn execute_bulk(&self, queries: &[Query]) -> Result<(), ExecError> {
        let mut conn = self.acquire()?;
        conn.execute_bulk(queries).await
    }
}

/// Create a SQL Server pool of `size` eagerly connected sessions.
///
/// Tiberius only sees a closed socket when it reads or writes, so an idle
/// session dropped by the server (a restart, a failover) is not recovered in
/// the background. The first statement on it fails with
/// `ExecError::Disconnected`, and the handle is reset when it is released.
///
/// # Errors
/// See [`Pool::initialize`].
#[cfg(feature = "mssql")]
pub async fn create_pool(
    config: &Config,
    size: usize,
) -> Result<Pool<crate::mssql::TiberiusSession>, PoolError> {
    Pool::initialize(&crate::mssql::TiberiusConnector, config, PoolConfig::new(size)).await
}
