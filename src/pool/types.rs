use crate::session::HandleId;

/// One pooled session and its pool-local identity.
pub(crate) struct ConnectionHandle<S> {
    pub(crate) id: HandleId,
    pub(crate) session: S,
}

/// Snapshot of a pool's handles.
///
/// `available + in_use + recovering == capacity` while the pool is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStatus {
    pub capacity: usize,
    /// Idle and connected, ready for `acquire`.
    pub available: usize,
    /// Lent to a caller.
    pub in_use: usize,
    /// Disconnected and being reset.
    pub recovering: usize,
}
