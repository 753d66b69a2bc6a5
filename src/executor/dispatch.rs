use futures_util::StreamExt;

use super::targets::QueryTarget;
use crate::config::Config;
use crate::error::{ConnError, ExecError};
use crate::query::{Query, Request};
use crate::results::{ResultRow, RowAccumulator};
use crate::session::{Connector, Session, StatementEvent};

/// Run one statement on `session` and collect every row it returns.
///
/// Rows of all result sets land in one list, each tagged with the metadata
/// that preceded it.
pub(crate) async fn run_statement<S>(session: &mut S, query: &Query) -> Result<Vec<ResultRow>, ExecError>
where
    S: Session + ?Sized,
{
    let request = Request::from_query(query)?;
    tracing::debug!(params = request.params.len(), "submitting statement");
    let mut events = session.submit(request).await?;

    let mut rows = RowAccumulator::default();
    while let Some(event) = events.next().await {
        match event? {
            StatementEvent::ColumnMetadata(columns) => rows.set_columns(columns),
            StatementEvent::Row(values) => rows.push(values)?,
            StatementEvent::Done => break,
        }
    }
    Ok(rows.finish())
}

/// Run one statement and drop its rows. Same failure rules as [`run_statement`].
pub(crate) async fn drain_statement<S>(session: &mut S, query: &Query) -> Result<(), ExecError>
where
    S: Session + ?Sized,
{
    let request = Request::from_query(query)?;
    tracing::debug!(params = request.params.len(), "submitting statement, rows discarded");
    let mut events = session.submit(request).await?;

    let mut has_metadata = false;
    while let Some(event) = events.next().await {
        match event? {
            StatementEvent::ColumnMetadata(_) => has_metadata = true,
            StatementEvent::Row(_) if !has_metadata => {
                return Err(ExecError::Protocol(
                    "row received before column metadata".to_string(),
                ));
            }
            StatementEvent::Row(_) => {}
            StatementEvent::Done => break,
        }
    }
    Ok(())
}

/// Open a fresh session for a one-off call.
///
/// # Errors
/// Returns the connect failure; the session is closed before returning it.
pub(crate) async fn open_session<C: Connector>(
    connector: &C,
    config: &Config,
) -> Result<C::Session, ConnError> {
    let mut session = connector.session(config);
    if let Err(err) = session.connect().await {
        tracing::warn!(server = %config.server, error = %err, "failed to open session");
        session.close().await;
        return Err(err);
    }
    Ok(session)
}

/// Execute one statement against a pool, a config or any other [`QueryTarget`].
///
/// # Errors
/// Returns the first error the statement produced.
pub async fn execute<T>(target: &T, query: &Query) -> Result<Vec<ResultRow>, ExecError>
where
    T: QueryTarget + ?Sized,
{
    target.execute(query).await
}

/// Execute one statement on a session built by `connector` just for this call.
///
/// The session is closed afterwards whatever the outcome.
///
/// # Errors
/// Returns `ExecError::Connection` if the session cannot be opened, otherwise
/// the statement's first error.
pub async fn execute_with<C: Connector>(
    connector: &C,
    config: &Config,
    query: &Query,
) -> Result<Vec<ResultRow>, ExecError> {
    let mut session = open_session(connector, config).await?;
    let result = run_statement(&mut session, query).await;
    session.close().await;
    result
}
