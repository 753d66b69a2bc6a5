use async_trait::async_trait;

use super::dispatch::execute_with;
use crate::bulk::execute_bulk_with;
use crate::config::Config;
use crate::error::ExecError;
use crate::query::Query;
use crate::results::ResultRow;
use crate::session::Connector;

/// Anything a statement can be executed against.
///
/// Implemented by [`Pool`](crate::pool::Pool), which lends a handle for the call,
/// by [`Config`], which opens and closes a session per call, and by [`Direct`]
/// for per-call sessions from a custom [`Connector`].
#[async_trait]
pub trait QueryTarget: Sync {
    /// Run one statement and return its rows.
    async fn execute(&self, query: &Query) -> Result<Vec<ResultRow>, ExecError>;

    /// Run statements one after another on a single session, stopping at the
    /// first failure.
    async fn execute_bulk(&self, queries: &[Query]) -> Result<(), ExecError>;
}

/// A config paired with the connector that builds its sessions.
#[derive(Debug, Clone)]
pub struct Direct<C> {
    pub connector: C,
    pub config: Config,
}

impl<C: Connector> Direct<C> {
    #[must_use]
    pub fn new(connector: C, config: Config) -> Self {
        Self { connector, config }
    }
}

#[async_trait]
impl<C: Connector> QueryTarget for Direct<C> {
    async fn execute(&self, query: &Query) -> Result<Vec<ResultRow>, ExecError> {
        execute_with(&self.connector, &self.config, query).await
    }

    async fn execute_bulk(&self, queries: &[Query]) -> Result<(), ExecError> {
        execute_bulk_with(&self.connector, &self.config, queries).await
    }
}

#[cfg(feature = "mssql")]
#[async_trait]
impl QueryTarget for Config {
    async fn execute(&self, query: &Query) -> Result<Vec<ResultRow>, ExecError> {
        execute_with(&crate::mssql::TiberiusConnector, self, query).await
    }

    async fn execute_bulk(&self, queries: &[Query]) -> Result<(), ExecError> {
        execute_bulk_with(&crate::mssql::TiberiusConnector, self, queries).await
    }
}
