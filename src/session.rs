//! The seam between this crate and a wire-protocol driver.
//!
//! A driver supplies a [`Connector`] that builds unconnected [`Session`]s from a
//! [`Config`]. A session exposes connect/close/reset, submits one statement at a
//! time, and reports the statement's metadata, rows and completion as a stream
//! of [`StatementEvent`]s. Unexpected remote closes are reported through the
//! [`DisconnectNotifier`] installed by whoever owns the session.

use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use tokio::sync::mpsc::UnboundedSender;

use crate::config::Config;
use crate::error::{ConnError, ExecError};
use crate::helpers::lock;
use crate::query::Request;
use crate::types::RowValues;

/// Lifecycle of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Connecting,
    Connected,
    /// A statement is in flight.
    Busy,
    Disconnected,
}

/// One event of a running statement.
#[derive(Debug, Clone, PartialEq)]
pub enum StatementEvent {
    /// Column names for the rows that follow.
    ColumnMetadata(Vec<String>),
    /// Values in the order of the active column metadata.
    Row(Vec<RowValues>),
    /// The statement completed; later events are ignored.
    Done,
}

/// Event channel of one submitted statement. The first `Err` settles it.
pub type EventStream<'a> = BoxStream<'a, Result<StatementEvent, ExecError>>;

#[async_trait]
pub trait Session: Send {
    /// Open the session. Must succeed before any statement is submitted.
    async fn connect(&mut self) -> Result<(), ConnError>;

    /// Release the underlying session. Idempotent.
    async fn close(&mut self);

    /// Re-synchronize a session the peer closed or that is in an error state,
    /// keeping this object.
    async fn reset(&mut self) -> Result<(), ConnError>;

    /// Submit one statement. Only one statement may be in flight per session.
    async fn submit<'a>(&'a mut self, request: Request) -> Result<EventStream<'a>, ExecError>;

    fn state(&self) -> ConnectionState;

    /// Install the callback fired when the remote peer ends the session.
    fn set_disconnect_notifier(&mut self, notifier: DisconnectNotifier);
}

/// Builds sessions for a target.
pub trait Connector: Send + Sync {
    type Session: Session + 'static;

    /// A new, not yet connected session for `config`.
    fn session(&self, config: &Config) -> Self::Session;
}

/// Pool-local identity of a connection handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(pub(crate) u64);

impl HandleId {
    /// Position of the handle in its pool, in connect order.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Reports a remote close of one handle to its owner.
#[derive(Debug, Clone)]
pub struct DisconnectNotifier {
    id: HandleId,
    sender: UnboundedSender<HandleId>,
}

impl DisconnectNotifier {
    pub(crate) fn new(id: HandleId, sender: UnboundedSender<HandleId>) -> Self {
        Self { id, sender }
    }

    #[must_use]
    pub fn handle_id(&self) -> HandleId {
        self.id
    }

    pub fn notify(&self) {
        // the owner may already be gone
        let _ = self.sender.send(self.id);
    }
}

/// State and disconnect notifier shared between a session and the streams it
/// hands out.
///
/// Drivers keep one of these per session so a stream that observes the peer
/// going away can flip the state without borrowing the session.
#[derive(Debug)]
pub struct SessionLink {
    state: Mutex<ConnectionState>,
    notifier: Mutex<Option<DisconnectNotifier>>,
}

impl Default for SessionLink {
    fn default() -> Self {
        Self {
            state: Mutex::new(ConnectionState::Connecting),
            notifier: Mutex::new(None),
        }
    }
}

impl SessionLink {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *lock(&self.state)
    }

    pub fn set_state(&self, state: ConnectionState) {
        *lock(&self.state) = state;
    }

    /// Back to `Connected` if a statement was running; no-op otherwise.
    pub fn settle(&self) {
        let mut state = lock(&self.state);
        if *state == ConnectionState::Busy {
            *state = ConnectionState::Connected;
        }
    }

    pub fn install(&self, notifier: DisconnectNotifier) {
        *lock(&self.notifier) = Some(notifier);
    }

    /// Record that the remote peer ended the session. Notifies only on the
    /// transition into `Disconnected`.
    pub fn peer_closed(&self) {
        let was_open = {
            let mut state = lock(&self.state);
            let was_open = matches!(
                *state,
                ConnectionState::Connected | ConnectionState::Busy
            );
            *state = ConnectionState::Disconnected;
            was_open
        };
        if was_open {
            if let Some(notifier) = lock(&self.notifier).as_ref() {
                notifier.notify();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn peer_close_notifies_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let link = SessionLink::new();
        link.install(DisconnectNotifier::new(HandleId(3), tx));
        link.set_state(ConnectionState::Connected);

        link.peer_closed();
        link.peer_closed();

        assert_eq!(link.state(), ConnectionState::Disconnected);
        assert_eq!(rx.try_recv().unwrap(), HandleId(3));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn local_close_does_not_notify() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let link = SessionLink::new();
        link.install(DisconnectNotifier::new(HandleId(0), tx));
        link.set_state(ConnectionState::Connected);

        link.set_state(ConnectionState::Disconnected);
        link.peer_closed();

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn settle_only_leaves_busy() {
        let link = SessionLink::new();
        link.set_state(ConnectionState::Busy);
        link.settle();
        assert_eq!(link.state(), ConnectionState::Connected);

        link.set_state(ConnectionState::Disconnected);
        link.settle();
        assert_eq!(link.state(), ConnectionState::Disconnected);
    }
}
