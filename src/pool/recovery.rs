use std::sync::{Arc, Weak};

use tokio::sync::mpsc::UnboundedReceiver;

use super::{ConnectionHandle, PoolShared};
use crate::session::{HandleId, Session};

/// Reset a disconnected handle until it reconnects or the pool closes.
///
/// Attempts are unbounded; the delay between them follows the pool's
/// [`RecoveryPolicy`](crate::config::RecoveryPolicy).
pub(super) async fn recover<S: Session + 'static>(
    shared: Arc<PoolShared<S>>,
    mut handle: ConnectionHandle<S>,
) {
    let policy = shared.recovery;
    let mut delay = policy.initial_backoff;
    let mut attempts: u64 = 0;

    loop {
        if shared.is_closed() {
            handle.session.close().await;
            shared.forget(handle.id);
            tracing::debug!(pool = shared.id, handle = %handle.id, "recovery abandoned, pool closed");
            return;
        }

        attempts += 1;
        match handle.session.reset().await {
            Ok(()) => break,
            Err(err) => {
                tracing::debug!(
                    pool = shared.id,
                    handle = %handle.id,
                    attempt = attempts,
                    retry_in = ?delay,
                    error = %err,
                    "connection reset failed"
                );
                if delay.is_zero() {
                    tokio::task::yield_now().await;
                } else {
                    tokio::time::sleep(delay).await;
                }
                delay = policy.next_delay(delay);
            }
        }
    }

    tracing::info!(pool = shared.id, handle = %handle.id, attempts, "connection recovered");
    shared.restore(handle);
}

/// Forward peer-close reports to the pool while it is alive.
pub(super) async fn watch_disconnects<S: Session + 'static>(
    pool: Weak<PoolShared<S>>,
    mut disconnects: UnboundedReceiver<HandleId>,
) {
    while let Some(id) = disconnects.recv().await {
        let Some(shared) = pool.upgrade() else {
            break;
        };
        shared.on_disconnect(id);
    }
}
