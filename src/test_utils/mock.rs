//! In-memory driver for exercising pools and executors without a server.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::{StreamExt, future, stream};

use super::script::default_reply;
use crate::config::Config;
use crate::error::{ConnError, ExecError};
use crate::helpers::lock;
use crate::query::Request;
use crate::session::{
    ConnectionState, Connector, DisconnectNotifier, EventStream, Session, SessionLink,
    StatementEvent,
};
use crate::types::RowValues;

/// How the mock answers one statement.
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    /// One result set.
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<RowValues>>,
    },
    /// Several result sets from one statement.
    ResultSets(Vec<(Vec<String>, Vec<Vec<RowValues>>)>),
    /// Completes without a result set.
    Empty,
    ServerError { code: u32, message: String },
    /// The peer drops the session mid-statement.
    Disconnect,
    /// Never completes.
    Hang,
    /// Emitted verbatim, followed by nothing. The session stays busy until
    /// the caller reads past a `Done` or to the end.
    Events(Vec<StatementEvent>),
}

impl MockReply {
    #[must_use]
    pub fn rows(columns: &[&str], rows: Vec<Vec<RowValues>>) -> Self {
        MockReply::Rows {
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            rows,
        }
    }

    #[must_use]
    pub fn server_error(code: u32, message: &str) -> Self {
        MockReply::ServerError {
            code,
            message: message.to_string(),
        }
    }
}

/// A statement as the mock server received it.
#[derive(Debug, Clone, PartialEq)]
pub struct IssuedRequest {
    /// Index of the session that sent it, in creation order.
    pub session: usize,
    pub request: Request,
}

/// Shared state behind every session of a [`MockConnector`].
#[derive(Debug, Default)]
pub struct MockServer {
    state: Mutex<ServerState>,
}

#[derive(Debug, Default)]
struct ServerState {
    replies: HashMap<String, MockReply>,
    once: HashMap<String, VecDeque<MockReply>>,
    issued: Vec<IssuedRequest>,
    sessions: Vec<Arc<SessionLink>>,
    connect_attempts: usize,
    failing_connects: HashSet<usize>,
    reset_attempts: usize,
    failing_resets: usize,
    closes: usize,
}

impl MockServer {
    /// Answer `sql` with `reply` from now on.
    pub fn reply(&self, sql: &str, reply: MockReply) {
        lock(&self.state)
            .replies
            .insert(sql.trim().to_string(), reply);
    }

    /// Answer the next occurrence of `sql` with `reply`, then fall back to the
    /// previous behaviour.
    pub fn reply_once(&self, sql: &str, reply: MockReply) {
        lock(&self.state)
            .once
            .entry(sql.trim().to_string())
            .or_default()
            .push_back(reply);
    }

    /// Make connect attempt number `attempt` (1-based, across all sessions) fail.
    pub fn fail_connect_attempt(&self, attempt: usize) {
        lock(&self.state).failing_connects.insert(attempt);
    }

    /// Make the next `count` resets fail.
    pub fn fail_next_resets(&self, count: usize) {
        lock(&self.state).failing_resets = count;
    }

    /// Simulate the peer closing session `index`.
    ///
    /// Returns false if there is no such session.
    pub fn disconnect(&self, index: usize) -> bool {
        let link = lock(&self.state).sessions.get(index).cloned();
        match link {
            Some(link) => {
                link.peer_closed();
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn issued(&self) -> Vec<IssuedRequest> {
        lock(&self.state).issued.clone()
    }

    #[must_use]
    pub fn issued_sql(&self) -> Vec<String> {
        lock(&self.state)
            .issued
            .iter()
            .map(|issued| issued.request.sql.clone())
            .collect()
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        lock(&self.state).sessions.len()
    }

    #[must_use]
    pub fn session_state(&self, index: usize) -> Option<ConnectionState> {
        lock(&self.state).sessions.get(index).map(|link| link.state())
    }

    #[must_use]
    pub fn connect_attempts(&self) -> usize {
        lock(&self.state).connect_attempts
    }

    #[must_use]
    pub fn reset_attempts(&self) -> usize {
        lock(&self.state).reset_attempts
    }

    /// Sessions closed from an open state.
    #[must_use]
    pub fn closes(&self) -> usize {
        lock(&self.state).closes
    }

    fn register(&self, link: Arc<SessionLink>) -> usize {
        let mut state = lock(&self.state);
        state.sessions.push(link);
        state.sessions.len() - 1
    }

    fn connect_allowed(&self) -> bool {
        let mut state = lock(&self.state);
        state.connect_attempts += 1;
        let attempt = state.connect_attempts;
        !state.failing_connects.contains(&attempt)
    }

    fn reset_allowed(&self) -> bool {
        let mut state = lock(&self.state);
        state.reset_attempts += 1;
        if state.failing_resets > 0 {
            state.failing_resets -= 1;
            false
        } else {
            true
        }
    }

    fn record_close(&self) {
        lock(&self.state).closes += 1;
    }

    fn answer(&self, session: usize, request: &Request) -> MockReply {
        let scripted = {
            let mut state = lock(&self.state);
            state.issued.push(IssuedRequest {
                session,
                request: request.clone(),
            });
            let sql = request.sql.trim();
            let once = state.once.get_mut(sql).and_then(VecDeque::pop_front);
            once.or_else(|| state.replies.get(sql).cloned())
        };
        scripted.unwrap_or_else(|| default_reply(request))
    }
}

/// Builds [`MockSession`]s that all talk to one [`MockServer`].
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    server: Arc<MockServer>,
}

impl MockConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn server(&self) -> Arc<MockServer> {
        Arc::clone(&self.server)
    }
}

impl Connector for MockConnector {
    type Session = MockSession;

    fn session(&self, _config: &Config) -> MockSession {
        let link = SessionLink::new();
        let index = self.server.register(Arc::clone(&link));
        MockSession {
            index,
            server: Arc::clone(&self.server),
            link,
        }
    }
}

#[derive(Debug)]
pub struct MockSession {
    index: usize,
    server: Arc<MockServer>,
    link: Arc<SessionLink>,
}

impl MockSession {
    /// Creation order of this session on its server.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }
}

#[async_trait]
impl Session for MockSession {
    async fn connect(&mut self) -> Result<(), ConnError> {
        self.link.set_state(ConnectionState::Connecting);
        if self.server.connect_allowed() {
            self.link.set_state(ConnectionState::Connected);
            Ok(())
        } else {
            self.link.set_state(ConnectionState::Disconnected);
            Err(ConnError::Network("scripted connect failure".into()))
        }
    }

    async fn close(&mut self) {
        if matches!(
            self.link.state(),
            ConnectionState::Connected | ConnectionState::Busy
        ) {
            self.server.record_close();
        }
        self.link.set_state(ConnectionState::Disconnected);
    }

    async fn reset(&mut self) -> Result<(), ConnError> {
        if self.server.reset_allowed() {
            self.link.set_state(ConnectionState::Connected);
            Ok(())
        } else {
            self.link.set_state(ConnectionState::Disconnected);
            Err(ConnError::Network("scripted reset failure".into()))
        }
    }

    async fn submit<'a>(&'a mut self, request: Request) -> Result<EventStream<'a>, ExecError> {
        match self.link.state() {
            ConnectionState::Connected => {}
            ConnectionState::Busy => {
                return Err(ExecError::Protocol(
                    "a statement is already in flight on this session".into(),
                ));
            }
            ConnectionState::Connecting | ConnectionState::Disconnected => {
                return Err(ExecError::Disconnected("session is not connected".into()));
            }
        }

        let reply = self.server.answer(self.index, &request);
        self.link.set_state(ConnectionState::Busy);
        let events: Vec<Result<StatementEvent, ExecError>> = match reply {
            MockReply::Hang => return Ok(Box::pin(stream::pending())),
            MockReply::Disconnect => {
                self.link.peer_closed();
                vec![Err(ExecError::Disconnected("connection reset by peer".into()))]
            }
            MockReply::ServerError { code, message } => {
                vec![Err(ExecError::Server { code, message })]
            }
            MockReply::Empty => vec![Ok(StatementEvent::Done)],
            MockReply::Rows { columns, rows } => result_set_events(vec![(columns, rows)]),
            MockReply::ResultSets(sets) => result_set_events(sets),
            MockReply::Events(events) => events.into_iter().map(Ok).collect(),
        };
        // busy until the statement reaches a terminal event, like a driver stream
        let link = Arc::clone(&self.link);
        let tail_link = Arc::clone(&self.link);
        let tail = stream::once(async move {
            tail_link.settle();
            None
        })
        .filter_map(future::ready);
        let events = stream::iter(events)
            .inspect(move |event| {
                if matches!(event, Ok(StatementEvent::Done) | Err(_)) {
                    link.settle();
                }
            })
            .chain(tail);
        Ok(Box::pin(events))
    }

    fn state(&self) -> ConnectionState {
        self.link.state()
    }

    fn set_disconnect_notifier(&mut self, notifier: DisconnectNotifier) {
        self.link.install(notifier);
    }
}

fn result_set_events(
    sets: Vec<(Vec<String>, Vec<Vec<RowValues>>)>,
) -> Vec<Result<StatementEvent, ExecError>> {
    let mut events = Vec::new();
    for (columns, rows) in sets {
        events.push(Ok(StatementEvent::ColumnMetadata(columns)));
        events.extend(rows.into_iter().map(|row| Ok(StatementEvent::Row(row))));
    }
    events.push(Ok(StatementEvent::Done));
    events
}
