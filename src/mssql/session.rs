use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::{Instant, timeout_at};

use super::client::{MssqlClient, create_mssql_client};
use super::params::bind_request;
use super::query::{StatementStream, exec_error};
use crate::config::Config;
use crate::error::{ConnError, ExecError};
use crate::query::Request;
use crate::session::{
    ConnectionState, Connector, DisconnectNotifier, EventStream, Session, SessionLink,
};

/// Builds [`TiberiusSession`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct TiberiusConnector;

impl Connector for TiberiusConnector {
    type Session = TiberiusSession;

    fn session(&self, config: &Config) -> TiberiusSession {
        TiberiusSession::new(config.clone())
    }
}

/// One SQL Server session over tiberius.
///
/// Tiberius only notices a dead socket when it reads or writes, so a remote
/// close is reported on the next statement rather than while idle.
pub struct TiberiusSession {
    config: Config,
    client: Option<MssqlClient>,
    link: Arc<SessionLink>,
}

impl TiberiusSession {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            client: None,
            link: SessionLink::new(),
        }
    }
}

impl fmt::Debug for TiberiusSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TiberiusSession")
            .field("server", &self.config.server)
            .field("state", &self.link.state())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Session for TiberiusSession {
    async fn connect(&mut self) -> Result<(), ConnError> {
        self.link.set_state(ConnectionState::Connecting);
        match create_mssql_client(&self.config).await {
            Ok(client) => {
                self.client = Some(client);
                self.link.set_state(ConnectionState::Connected);
                Ok(())
            }
            Err(err) => {
                self.link.set_state(ConnectionState::Disconnected);
                Err(err)
            }
        }
    }

    async fn close(&mut self) {
        self.link.set_state(ConnectionState::Disconnected);
        if let Some(client) = self.client.take() {
            if let Err(e) = client.close().await {
                tracing::debug!(error = %e, "error while closing SQL Server session");
            }
        }
    }

    async fn reset(&mut self) -> Result<(), ConnError> {
        // the old socket may sit mid-stream; drop it without a goodbye
        self.client = None;
        self.connect().await
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
        let Some(client) = self.client.as_mut() else {
            return Err(ExecError::Disconnected("session is not connected".into()));
        };

        let limit = self.config.request_timeout();
        let deadline = Instant::now() + limit;
        let link = Arc::clone(&self.link);
        link.set_state(ConnectionState::Busy);

        let stream = match timeout_at(deadline, bind_request(request).query(client)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(err)) => {
                let err = exec_error(err, &link);
                link.settle();
                return Err(err);
            }
            Err(_) => {
                link.set_state(ConnectionState::Disconnected);
                return Err(ExecError::Timeout(limit));
            }
        };

        Ok(Box::pin(StatementStream::new(
            Box::pin(stream),
            deadline,
            limit,
            link,
        )))
    }

    fn state(&self) -> ConnectionState {
        self.link.state()
    }

    fn set_disconnect_notifier(&mut self, notifier: DisconnectNotifier) {
        self.link.install(notifier);
    }
}
