use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use futures_util::Stream;
use futures_util::stream::BoxStream;
use tiberius::error::Error as TiberiusError;
use tiberius::{ColumnData, FromSql, QueryItem};
use tokio::time::{Instant, Sleep};

use crate::error::ExecError;
use crate::session::{ConnectionState, SessionLink, StatementEvent};
use crate::types::RowValues;

/// Events of one running statement, bounded by the request timeout.
///
/// `deadline` is the one taken before the request was sent, so submission and
/// streaming share a single bound. Emits `Done` once the driver stream ends. A
/// timeout leaves the session in an unknown position of the token stream, so it
/// is marked disconnected.
pub(crate) struct StatementStream<'a> {
    inner: BoxStream<'a, tiberius::Result<QueryItem>>,
    deadline: Pin<Box<Sleep>>,
    limit: Duration,
    link: Arc<SessionLink>,
    finished: bool,
}

impl<'a> StatementStream<'a> {
    pub(crate) fn new(
        inner: BoxStream<'a, tiberius::Result<QueryItem>>,
        deadline: Instant,
        limit: Duration,
        link: Arc<SessionLink>,
    ) -> Self {
        Self {
            inner,
            deadline: Box::pin(tokio::time::sleep_until(deadline)),
            limit,
            link,
            finished: false,
        }
    }

    fn settle_with(
        &mut self,
        result: Result<StatementEvent, ExecError>,
    ) -> Poll<Option<Result<StatementEvent, ExecError>>> {
        self.finished = true;
        self.link.settle();
        Poll::Ready(Some(result))
    }
}

impl Stream for StatementStream<'_> {
    type Item = Result<StatementEvent, ExecError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(item))) => match to_event(item) {
                Ok(event) => Poll::Ready(Some(Ok(event))),
                Err(err) => this.settle_with(Err(err)),
            },
            Poll::Ready(Some(Err(err))) => {
                let err = exec_error(err, &this.link);
                this.settle_with(Err(err))
            }
            Poll::Ready(None) => this.settle_with(Ok(StatementEvent::Done)),
            Poll::Pending => match this.deadline.as_mut().poll(cx) {
                Poll::Ready(()) => {
                    this.finished = true;
                    this.link.set_state(ConnectionState::Disconnected);
                    tracing::warn!(timeout = ?this.limit, "statement timed out; session marked for reset");
                    Poll::Ready(Some(Err(ExecError::Timeout(this.limit))))
                }
                Poll::Pending => Poll::Pending,
            },
        }
    }
}

fn to_event(item: QueryItem) -> Result<StatementEvent, ExecError> {
    match item {
        QueryItem::Metadata(meta) => Ok(StatementEvent::ColumnMetadata(
            meta.columns()
                .iter()
                .map(|col| col.name().to_string())
                .collect(),
        )),
        QueryItem::Row(row) => {
            let values = row
                .into_iter()
                .map(column_value)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(StatementEvent::Row(values))
        }
    }
}

/// Map a driver failure during a statement. I/O failures mean the peer is gone.
pub(crate) fn exec_error(err: TiberiusError, link: &SessionLink) -> ExecError {
    match err {
        TiberiusError::Server(token) => ExecError::Server {
            code: token.code(),
            message: token.message().to_string(),
        },
        TiberiusError::Io { kind, message } => {
            link.peer_closed();
            ExecError::Disconnected(format!("{kind:?}: {message}"))
        }
        other => ExecError::Protocol(other.to_string()),
    }
}

fn column_value(data: ColumnData<'static>) -> Result<RowValues, ExecError> {
    let value = match data {
        ColumnData::U8(v) => v.map(|v| RowValues::Int(i64::from(v))),
        ColumnData::I16(v) => v.map(|v| RowValues::Int(i64::from(v))),
        ColumnData::I32(v) => v.map(|v| RowValues::Int(i64::from(v))),
        ColumnData::I64(v) => v.map(RowValues::Int),
        ColumnData::F32(v) => v.map(|v| RowValues::Float(f64::from(v))),
        ColumnData::F64(v) => v.map(RowValues::Float),
        ColumnData::Bit(v) => v.map(RowValues::Bool),
        ColumnData::String(v) => v.map(|s| RowValues::Text(s.into_owned())),
        ColumnData::Guid(v) => v.map(|g| RowValues::Text(g.to_string())),
        ColumnData::Binary(v) => v.map(|b| RowValues::Blob(b.into_owned())),
        ColumnData::Numeric(v) => v.map(|n| RowValues::Float(f64::from(n))),
        ColumnData::Xml(v) => v.map(|x| RowValues::Text(x.into_owned().into_string())),
        temporal => temporal_value(&temporal)?,
    };
    Ok(value.unwrap_or(RowValues::Null))
}

fn temporal_value(data: &ColumnData<'static>) -> Result<Option<RowValues>, ExecError> {
    let convert = |e: TiberiusError| ExecError::Protocol(format!("temporal conversion failed: {e}"));
    match data {
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            Ok(NaiveDateTime::from_sql(data).map_err(convert)?.map(RowValues::Timestamp))
        }
        ColumnData::Date(_) => Ok(NaiveDate::from_sql(data)
            .map_err(convert)?
            .map(|d| RowValues::Timestamp(d.and_time(NaiveTime::MIN)))),
        ColumnData::Time(_) => Ok(NaiveTime::from_sql(data)
            .map_err(convert)?
            .map(|t| RowValues::Text(t.to_string()))),
        ColumnData::DateTimeOffset(_) => Ok(DateTime::<Utc>::from_sql(data)
            .map_err(convert)?
            .map(|dt| RowValues::Timestamp(dt.naive_utc()))),
        other => Err(ExecError::Protocol(format!(
            "unsupported column type: {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{DisconnectNotifier, HandleId};
    use futures_util::{StreamExt, stream};
    use std::borrow::Cow;
    use tokio::sync::mpsc;

    fn busy_link() -> (Arc<SessionLink>, mpsc::UnboundedReceiver<HandleId>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let link = SessionLink::new();
        link.install(DisconnectNotifier::new(HandleId(0), tx));
        link.set_state(ConnectionState::Busy);
        (link, rx)
    }

    fn statement<'a>(
        inner: BoxStream<'a, tiberius::Result<QueryItem>>,
        limit: Duration,
        link: &Arc<SessionLink>,
    ) -> StatementStream<'a> {
        StatementStream::new(inner, Instant::now() + limit, limit, Arc::clone(link))
    }

    #[tokio::test(flavor = "current_thread")]
    async fn timeout_marks_session_disconnected_without_notifying() {
        let (link, mut rx) = busy_link();
        let limit = Duration::from_millis(20);
        let mut events = statement(stream::pending().boxed(), limit, &link);

        let first = events.next().await;
        assert!(matches!(first, Some(Err(ExecError::Timeout(l))) if l == limit));
        assert_eq!(link.state(), ConnectionState::Disconnected);
        assert!(rx.try_recv().is_err());
        assert!(events.next().await.is_none());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn deadline_taken_at_submission_is_not_restarted() {
        let (link, _rx) = busy_link();
        let limit = Duration::from_millis(30);
        let submitted = Instant::now();
        tokio::time::sleep(limit).await;

        let mut events = StatementStream::new(
            stream::pending().boxed(),
            submitted + limit,
            limit,
            Arc::clone(&link),
        );
        let first = tokio::time::timeout(Duration::from_millis(10), events.next()).await;
        assert!(matches!(first, Ok(Some(Err(ExecError::Timeout(_))))));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn end_of_stream_emits_done_and_settles() {
        let (link, mut rx) = busy_link();
        let mut events = statement(stream::empty().boxed(), Duration::from_secs(5), &link);

        assert!(matches!(events.next().await, Some(Ok(StatementEvent::Done))));
        assert_eq!(link.state(), ConnectionState::Connected);
        assert!(events.next().await.is_none());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn driver_error_settles_and_ends_the_stream() {
        let (link, _rx) = busy_link();
        let inner = stream::iter(vec![
            Err(TiberiusError::Protocol("unexpected token".into())),
            Err(TiberiusError::Protocol("never read".into())),
        ])
        .boxed();
        let mut events = statement(inner, Duration::from_secs(5), &link);

        assert!(matches!(events.next().await, Some(Err(ExecError::Protocol(_)))));
        assert_eq!(link.state(), ConnectionState::Connected);
        assert!(events.next().await.is_none());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn io_error_mid_stream_notifies_once() {
        let (link, mut rx) = busy_link();
        let inner = stream::iter(vec![Err(TiberiusError::Io {
            kind: std::io::ErrorKind::UnexpectedEof,
            message: "eof".into(),
        })])
        .boxed();
        let mut events = statement(inner, Duration::from_secs(5), &link);

        assert!(matches!(events.next().await, Some(Err(ExecError::Disconnected(_)))));
        assert_eq!(link.state(), ConnectionState::Disconnected);
        assert_eq!(rx.try_recv().unwrap(), HandleId(0));
        assert!(events.next().await.is_none());
    }

    #[test]
    fn scalar_columns_convert() {
        assert_eq!(column_value(ColumnData::I32(Some(5))).unwrap(), RowValues::Int(5));
        assert_eq!(column_value(ColumnData::U8(Some(255))).unwrap(), RowValues::Int(255));
        assert_eq!(column_value(ColumnData::F64(Some(0.5))).unwrap(), RowValues::Float(0.5));
        assert_eq!(column_value(ColumnData::Bit(Some(true))).unwrap(), RowValues::Bool(true));
        assert_eq!(
            column_value(ColumnData::String(Some(Cow::Borrowed("hi")))).unwrap(),
            RowValues::Text("hi".into())
        );
        assert_eq!(
            column_value(ColumnData::Binary(Some(Cow::Owned(vec![1, 2])))).unwrap(),
            RowValues::Blob(vec![1, 2])
        );
    }

    #[test]
    fn null_columns_become_null() {
        assert_eq!(column_value(ColumnData::I64(None)).unwrap(), RowValues::Null);
        assert_eq!(column_value(ColumnData::String(None)).unwrap(), RowValues::Null);
        assert_eq!(column_value(ColumnData::DateTime2(None)).unwrap(), RowValues::Null);
    }

    #[test]
    fn io_failure_marks_link_disconnected() {
        let link = SessionLink::new();
        link.set_state(ConnectionState::Busy);
        let err = exec_error(
            TiberiusError::Io {
                kind: std::io::ErrorKind::ConnectionReset,
                message: "reset".into(),
            },
            &link,
        );
        assert!(matches!(err, ExecError::Disconnected(_)));
        assert_eq!(link.state(), ConnectionState::Disconnected);
    }
}
