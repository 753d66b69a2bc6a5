use crate::config::Config;
use crate::error::ExecError;
use crate::executor::{QueryTarget, drain_statement, open_session};
use crate::query::Query;
use crate::session::{Connector, Session};

/// Run `queries` in order on one session, discarding their rows.
///
/// Statement `n + 1` is only submitted after statement `n` completed. The
/// first failure stops the run and is returned as is.
pub(crate) async fn run_bulk<S>(session: &mut S, queries: &[Query]) -> Result<(), ExecError>
where
    S: Session + ?Sized,
{
    for (index, query) in queries.iter().enumerate() {
        if let Err(err) = drain_statement(session, query).await {
            tracing::warn!(
                index,
                total = queries.len(),
                error = %err,
                "bulk run stopped at failing statement"
            );
            return Err(err);
        }
    }
    tracing::debug!(statements = queries.len(), "bulk run completed");
    Ok(())
}

/// Run a list of statements sequentially against `target`.
///
/// An empty list succeeds without touching the target.
///
/// # Errors
/// Returns the first statement error; later statements are never submitted.
pub async fn execute_bulk<T>(target: &T, queries: &[Query]) -> Result<(), ExecError>
where
    T: QueryTarget + ?Sized,
{
    if queries.is_empty() {
        return Ok(());
    }
    target.execute_bulk(queries).await
}

/// Run statements sequentially on a session opened just for this call.
///
/// # Errors
/// Returns `ExecError::Connection` if the session cannot be opened, otherwise
/// the first statement error.
pub async fn execute_bulk_with<C: Connector>(
    connector: &C,
    config: &Config,
    queries: &[Query],
) -> Result<(), ExecError> {
    let mut session = open_session(connector, config).await?;
    let result = run_bulk(&mut session, queries).await;
    session.close().await;
    result
}
