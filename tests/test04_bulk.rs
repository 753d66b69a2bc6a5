#![cfg(feature = "test-utils")]

use mssql_middleware::test_utils::{MockConnector, MockReply, test_config};
use mssql_middleware::{
    Direct, ExecError, MiddlewareError, Pool, PoolConfig, Query, RowValues, execute_bulk,
};

fn inserts(n: i64) -> Vec<Query> {
    (1..=n)
        .map(|i| Query::new(format!("insert into t values ({i})")))
        .collect()
}

#[tokio::test(flavor = "current_thread")]
async fn statements_run_in_order_on_one_session() -> Result<(), MiddlewareError> {
    let target = Direct::new(MockConnector::new(), test_config());
    let server = target.connector.server();

    execute_bulk(&target, &inserts(4)).await?;

    let issued = server.issued();
    let sql: Vec<_> = issued.iter().map(|i| i.request.sql.as_str()).collect();
    assert_eq!(
        sql,
        [
            "insert into t values (1)",
            "insert into t values (2)",
            "insert into t values (3)",
            "insert into t values (4)",
        ]
    );
    assert!(issued.iter().all(|i| i.session == 0));
    assert_eq!(server.session_count(), 1);
    assert_eq!(server.closes(), 1);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn first_failure_stops_the_run() {
    let target = Direct::new(MockConnector::new(), test_config());
    let server = target.connector.server();
    server.reply(
        "insert into t values (2)",
        MockReply::server_error(2627, "Violation of PRIMARY KEY constraint"),
    );

    let err = execute_bulk(&target, &inserts(4)).await.unwrap_err();
    assert!(matches!(err, ExecError::Server { code: 2627, .. }));

    // nothing after the failing statement was submitted
    assert_eq!(
        server.issued_sql(),
        ["insert into t values (1)", "insert into t values (2)"]
    );
    assert_eq!(server.closes(), 1);
}

#[tokio::test(flavor = "current_thread")]
async fn rows_are_discarded() -> Result<(), MiddlewareError> {
    let target = Direct::new(MockConnector::new(), test_config());
    target.connector.server().reply(
        "select * from t",
        MockReply::rows(&["id"], vec![vec![RowValues::Int(1)], vec![RowValues::Int(2)]]),
    );

    let queries = vec![Query::new("select * from t"), Query::new("select 1 as x")];
    execute_bulk(&target, &queries).await?;
    assert_eq!(target.connector.server().issued().len(), 2);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn empty_list_never_connects() -> Result<(), MiddlewareError> {
    let target = Direct::new(MockConnector::new(), test_config());
    execute_bulk(&target, &[]).await?;
    assert_eq!(target.connector.server().connect_attempts(), 0);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn pooled_bulk_uses_a_single_handle() -> Result<(), MiddlewareError> {
    let connector = MockConnector::new();
    let server = connector.server();
    let pool = Pool::initialize(&connector, &test_config(), PoolConfig::new(3)).await?;

    execute_bulk(&pool, &inserts(3)).await?;

    let sessions: Vec<_> = server.issued().iter().map(|i| i.session).collect();
    assert_eq!(sessions.len(), 3);
    assert!(sessions.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(pool.status().available, 3);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn parameters_flow_through_bulk() -> Result<(), MiddlewareError> {
    let target = Direct::new(MockConnector::new(), test_config());
    let queries: Vec<Query> = (0..3)
        .map(|i| Query::new("insert into t values (@v)").bind("v", i))
        .collect();

    execute_bulk(&target, &queries).await?;

    let values: Vec<_> = target
        .connector
        .server()
        .issued()
        .iter()
        .map(|i| i.request.params[0].value.clone())
        .collect();
    assert_eq!(
        values,
        [RowValues::Int(0), RowValues::Int(1), RowValues::Int(2)]
    );
    Ok(())
}
